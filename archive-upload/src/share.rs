#![doc = "Share API client: OAuth refresh-token rotation and folder sharing over reqwest."]
//
//! Implements [`TokenExchange`] and [`ShareService`] from the core crate.
//!
//! - Token rotation posts a `refresh_token` grant to `token_url`; the response
//!   carries a new access token and a new refresh token.
//! - Folder lookup pages through the items of the root folder and matches by
//!   exact name.
//! - Sharing adds one `viewer` collaboration per recipient and then requests a
//!   shared link restricted to collaborators.

use std::future::Future;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use archive_upload_core::contract::{ShareService, TokenExchange, TokenPair};
use archive_upload_core::error::ShareError;

use crate::load_config::HttpTimeouts;

const ROOT_FOLDER: &str = "0";
const PAGE_SIZE: u64 = 1000;

pub struct ShareApiClient {
    client: reqwest::Client,
    api_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    entries: Vec<Item>,
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SharedFolder {
    shared_link: Option<SharedLink>,
}

#[derive(Debug, Deserialize)]
struct SharedLink {
    url: String,
}

impl ShareApiClient {
    pub fn new(
        api_url: &str,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        timeouts: HttpTimeouts,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .build()?;
        tracing::info!(api_url, token_url, "Initialized share API client");
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }
}

fn transport(call: &'static str) -> impl Fn(reqwest::Error) -> ShareError {
    move |e| {
        tracing::error!(error = ?e, call, "Share API request failed");
        ShareError::Transport(format!("{call}: {e}"))
    }
}

/// Pass 2xx responses through; turn anything else into `ShareError::Status`.
async fn checked(
    resp: reqwest::Response,
    call: &'static str,
) -> Result<reqwest::Response, ShareError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::error!(call, status = status.as_u16(), body = %body, "Share API returned an error");
    Err(ShareError::Status {
        call,
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    call: &'static str,
) -> Result<T, ShareError> {
    resp.json::<T>()
        .await
        .map_err(|e| ShareError::Decode(format!("{call}: {e}")))
}

/// Id of the folder called `name` among `items`, if any.
fn pick_folder(items: &ItemList, name: &str) -> Option<String> {
    items
        .entries
        .iter()
        .find(|item| item.kind == "folder" && item.name == name)
        .map(|item| item.id.clone())
}

/// Walk the listing page by page until `name` is found or the listing ends.
/// `fetch_page` receives the offset of the page to load.
async fn scan_pages<F, Fut>(name: &str, mut fetch_page: F) -> Result<String, ShareError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<ItemList, ShareError>>,
{
    let mut offset = 0;
    loop {
        let page = fetch_page(offset).await?;
        if let Some(id) = pick_folder(&page, name) {
            return Ok(id);
        }
        offset += page.entries.len() as u64;
        let exhausted = page.entries.is_empty() || page.total_count.is_some_and(|t| offset >= t);
        if exhausted {
            tracing::error!(folder = name, scanned = offset, "Folder not found in root listing");
            return Err(ShareError::FolderNotFound(name.to_string()));
        }
    }
}

#[async_trait]
impl TokenExchange for ShareApiClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ShareError> {
        const CALL: &str = "token refresh";
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(transport(CALL))?;
        let tokens: TokenResponse = decode(checked(resp, CALL).await?, CALL).await?;
        Ok(TokenPair {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }
}

#[async_trait]
impl ShareService for ShareApiClient {
    async fn find_folder(&self, access_token: &str, name: &str) -> Result<String, ShareError> {
        const CALL: &str = "folder lookup";
        let url = self.endpoint(&format!("folders/{ROOT_FOLDER}/items"));
        scan_pages(name, |offset| {
            let request = self
                .client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[
                    ("fields", "id,type,name".to_string()),
                    ("limit", PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ]);
            async move {
                let resp = request.send().await.map_err(transport(CALL))?;
                decode::<ItemList>(checked(resp, CALL).await?, CALL).await
            }
        })
        .await
    }

    async fn grant_read(
        &self,
        access_token: &str,
        folder_id: &str,
        recipient: &str,
    ) -> Result<(), ShareError> {
        const CALL: &str = "collaboration";
        let body = json!({
            "item": { "type": "folder", "id": folder_id },
            "accessible_by": { "type": "user", "login": recipient },
            "role": "viewer",
        });
        let resp = self
            .client
            .post(self.endpoint("collaborations"))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport(CALL))?;
        checked(resp, CALL).await?;
        Ok(())
    }

    async fn create_share_link(
        &self,
        access_token: &str,
        folder_id: &str,
    ) -> Result<String, ShareError> {
        const CALL: &str = "shared link";
        let resp = self
            .client
            .put(self.endpoint(&format!("folders/{folder_id}")))
            .bearer_auth(access_token)
            .query(&[("fields", "shared_link")])
            .json(&json!({ "shared_link": { "access": "collaborators" } }))
            .send()
            .await
            .map_err(transport(CALL))?;
        let folder: SharedFolder = decode(checked(resp, CALL).await?, CALL).await?;
        folder
            .shared_link
            .map(|link| link.url)
            .ok_or_else(|| ShareError::Decode(format!("{CALL}: response has no shared_link")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_lookup_matches_folders_by_exact_name() {
        let items: ItemList = serde_json::from_value(json!({
            "entries": [
                { "id": "1", "type": "file", "name": "backup-2024-05-01" },
                { "id": "2", "type": "folder", "name": "backup-2024-05-01-old" },
                { "id": "3", "type": "folder", "name": "backup-2024-05-01" },
            ]
        }))
        .unwrap();
        assert_eq!(pick_folder(&items, "backup-2024-05-01").as_deref(), Some("3"));
        assert_eq!(pick_folder(&items, "backup-2024-05-02"), None);
    }

    fn page(ids: std::ops::Range<u32>, total: u64) -> ItemList {
        ItemList {
            entries: ids
                .map(|i| Item {
                    id: i.to_string(),
                    kind: "folder".into(),
                    name: format!("backup-{i:04}"),
                })
                .collect(),
            total_count: Some(total),
        }
    }

    #[tokio::test]
    async fn folder_lookup_follows_later_pages() {
        let mut offsets = Vec::new();
        let id = scan_pages("backup-1001", |offset| {
            offsets.push(offset);
            let start = offset as u32;
            futures::future::ready(Ok(page(start..(start + 1000).min(1002), 1002)))
        })
        .await
        .unwrap();
        assert_eq!(id, "1001");
        assert_eq!(offsets, vec![0, 1000]);
    }

    #[tokio::test]
    async fn folder_lookup_stops_when_the_listing_runs_out() {
        let mut calls = 0;
        let err = scan_pages("missing", |offset| {
            calls += 1;
            let start = offset as u32;
            futures::future::ready(Ok(page(start..(start + 2).min(5), 5)))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShareError::FolderNotFound(name) if name == "missing"));
        assert_eq!(calls, 3);

        // Without a total, an empty page ends the scan.
        let err = scan_pages("missing", |offset| {
            let entries = if offset == 0 { page(0..3, 0).entries } else { Vec::new() };
            futures::future::ready(Ok(ItemList {
                entries,
                total_count: None,
            }))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ShareError::FolderNotFound(_)));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let timeouts = HttpTimeouts {
            connect: std::time::Duration::from_secs(1),
            read: std::time::Duration::from_secs(1),
        };
        let client =
            ShareApiClient::new("https://api.example.com/2.0/", "t", "id", "s", timeouts).unwrap();
        assert_eq!(
            client.endpoint("collaborations"),
            "https://api.example.com/2.0/collaborations"
        );
    }
}
