#![doc = "WebDAV client: implements the core `Transport` and `RemoteStorage` traits over reqwest."]
//
//! # WebDAV integration
//!
//! - `MKCOL <dav_url>/<folder>` creates the run folder.
//! - `PUT <dav_url>/<folder>/<file>` uploads one file, streamed from disk with the
//!   length declared up front.
//!
//! The underlying `reqwest::Client` keeps at most `concurrency` idle connections
//! per host, so the dispatcher's transfer slots reuse connections between files.
//! Connect and read timeouts turn a stalled server into a transport error,
//! which the retry classifier treats like any other failed attempt.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Method, StatusCode, Url};
use tokio_util::io::ReaderStream;

use archive_upload_core::contract::{FolderOutcome, PutRequest, RemoteStorage, Transport};
use archive_upload_core::error::{StorageError, TransferError};

use crate::load_config::HttpTimeouts;

pub struct DavClient {
    client: reqwest::Client,
    base: Url,
    user: String,
    password: String,
    mkcol: Method,
}

impl DavClient {
    pub fn new(
        base_url: &str,
        user: &str,
        password: &str,
        concurrency: usize,
        timeouts: HttpTimeouts,
    ) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("WebDAV URL {base_url} cannot carry a path");
        }
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(concurrency)
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .build()?;
        tracing::info!(dav_url = %base, concurrency, ?timeouts, "Initialized WebDAV client");
        Ok(Self {
            client,
            base,
            user: user.to_string(),
            password: password.to_string(),
            mkcol: Method::from_bytes(b"MKCOL")?,
        })
    }

    /// `base` with `segments` appended, each percent-encoded.
    pub fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Map the MKCOL response status onto a folder outcome.
pub fn mkcol_outcome(status: StatusCode) -> Result<FolderOutcome, StorageError> {
    match status {
        s if s.is_success() => Ok(FolderOutcome::Created),
        // RFC 4918: MKCOL on an existing resource.
        StatusCode::METHOD_NOT_ALLOWED => Ok(FolderOutcome::AlreadyExists),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(StorageError::Unauthorized(status.as_u16()))
        }
        other => Err(StorageError::Status(other.as_u16())),
    }
}

#[async_trait]
impl RemoteStorage for DavClient {
    async fn create_folder(&self, name: &str) -> Result<FolderOutcome, StorageError> {
        let url = self.url_for(&[name]);
        tracing::info!(url = %url, "Creating remote folder");
        let resp = self
            .client
            .request(self.mkcol.clone(), url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, folder = name, "MKCOL request failed");
                StorageError::Transport(e.to_string())
            })?;
        mkcol_outcome(resp.status())
    }
}

#[async_trait]
impl Transport for DavClient {
    async fn put_file(&self, req: PutRequest) -> Result<(), TransferError> {
        let url = self.url_for(&[&req.folder, &req.filename]);
        let file = tokio::fs::File::open(&req.path).await?;

        let cursor = req.cursor.clone();
        let stream =
            ReaderStream::new(file).inspect_ok(move |chunk| cursor.advance(chunk.len() as u64));

        let resp = self
            .client
            .put(url)
            .basic_auth(&self.user, Some(&self.password))
            .header(CONTENT_LENGTH, req.size)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(file = %req.filename, status = status.as_u16(), "PUT succeeded");
            Ok(())
        } else {
            Err(TransferError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use archive_upload_core::pool::ByteCursor;
    use std::time::Duration;

    fn client(base: &str) -> DavClient {
        let timeouts = HttpTimeouts {
            connect: Duration::from_secs(1),
            read: Duration::from_millis(300),
        };
        DavClient::new(base, "user", "secret", 2, timeouts).unwrap()
    }

    #[tokio::test]
    async fn silent_server_fails_the_attempt_instead_of_hanging() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sql");
        std::fs::write(&path, b"payload").unwrap();
        let dav = client(&format!("http://{addr}/dav"));
        let req = PutRequest {
            folder: "backup-2024-01-01".into(),
            filename: "db.sql".into(),
            path,
            size: 7,
            cursor: ByteCursor::new(),
        };

        let result = tokio::time::timeout(Duration::from_secs(10), dav.put_file(req))
            .await
            .expect("read timeout should end the request");
        assert!(
            matches!(result, Err(TransferError::Transport(_))),
            "got {result:?}"
        );
    }

    #[test]
    fn file_urls_are_built_below_the_base_and_encoded() {
        let dav = client("https://dav.example.com/dav/");
        let url = dav.url_for(&["backup-2024-01-01", "db dump#1.sql"]);
        assert_eq!(
            url.as_str(),
            "https://dav.example.com/dav/backup-2024-01-01/db%20dump%231.sql"
        );

        let dav = client("https://dav.example.com/dav");
        assert_eq!(
            dav.url_for(&["f"]).as_str(),
            "https://dav.example.com/dav/f"
        );
    }

    #[test]
    fn mkcol_statuses_map_to_outcomes() {
        assert_eq!(
            mkcol_outcome(StatusCode::CREATED).unwrap(),
            FolderOutcome::Created
        );
        assert_eq!(
            mkcol_outcome(StatusCode::METHOD_NOT_ALLOWED).unwrap(),
            FolderOutcome::AlreadyExists
        );
        assert!(matches!(
            mkcol_outcome(StatusCode::UNAUTHORIZED),
            Err(StorageError::Unauthorized(401))
        ));
        assert!(matches!(
            mkcol_outcome(StatusCode::INSUFFICIENT_STORAGE),
            Err(StorageError::Status(507))
        ));
    }
}
