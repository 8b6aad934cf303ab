#![allow(unused)]

//! # contract: interfaces to every external collaborator of a run
//!
//! The transfer engine never speaks HTTP or SQL itself. It calls the traits in
//! this module, which the CLI crate implements against the real services
//! (WebDAV, the share API, the token database) and tests implement with mocks.
//!
//! - [`Transport`]: one upload attempt of one file.
//! - [`RemoteStorage`]: idempotent creation of the dated target folder.
//! - [`TokenExchange`] and [`CredentialStore`]: refresh-token rotation.
//! - [`ShareService`]: folder lookup, collaborator grants and the share link.
//!
//! All traits are annotated for `mockall`; the generated mocks are exported
//! behind the `test-export-mocks` feature so downstream crates can use them.

use std::path::PathBuf;

use async_trait::async_trait;
use mockall::{automock, predicate::*};

use crate::error::{ShareError, StorageError, TransferError};
use crate::pool::ByteCursor;

/// One upload attempt: everything a transport needs to PUT a file.
#[derive(Debug, Clone)]
pub struct PutRequest {
    /// Remote folder the file lands in.
    pub folder: String,
    /// Remote file name, identical to the local one.
    pub filename: String,
    /// Local path to stream the body from.
    pub path: PathBuf,
    /// Declared request size; must equal the file length.
    pub size: u64,
    /// Advanced by the transport as the body is read.
    pub cursor: ByteCursor,
}

/// Result of a folder creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderOutcome {
    Created,
    AlreadyExists,
}

/// Short-lived access token plus the rotated long-lived refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Uploads a single file.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stream `req.path` to `<folder>/<filename>`. Any error is treated as
    /// transient by the caller.
    async fn put_file(&self, req: PutRequest) -> Result<(), TransferError>;
}

/// Remote storage folder management.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Create `name` at the storage root. An existing folder is reported as
    /// [`FolderOutcome::AlreadyExists`], not as an error.
    async fn create_folder(&self, name: &str) -> Result<FolderOutcome, StorageError>;
}

/// Identity-provider token refresh.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ShareError>;
}

/// Persistent home of the refresh token.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_refresh_token(&self) -> Result<String, ShareError>;

    async fn save_refresh_token(&self, token: &str) -> Result<(), ShareError>;
}

/// Folder lookup and sharing calls made after the upload.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ShareService: Send + Sync {
    /// Resolve the remote identifier of the folder called `name`.
    async fn find_folder(&self, access_token: &str, name: &str) -> Result<String, ShareError>;

    /// Give `recipient` read access to the folder.
    async fn grant_read(
        &self,
        access_token: &str,
        folder_id: &str,
        recipient: &str,
    ) -> Result<(), ShareError>;

    /// Create a share link limited to the folder's collaborators.
    async fn create_share_link(
        &self,
        access_token: &str,
        folder_id: &str,
    ) -> Result<String, ShareError>;
}
