//! Error types shared by the transfer engine and its collaborators.

use std::path::PathBuf;

/// Failure of a single upload attempt.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server answered with status {0}")]
    Status(u16),

    /// The operator interrupted the run while the transfer was in flight.
    #[error("cancelled")]
    Cancelled,
}

/// Failure reported by the remote storage while creating the target folder.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not authorised (status {0})")]
    Unauthorized(u16),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure of a finalization call: token exchange, token persistence or sharing.
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("{call} failed with status {status}: {body}")]
    Status {
        call: &'static str,
        status: u16,
        body: String,
    },

    #[error("folder '{0}' not found")]
    FolderNotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("credential store error: {0}")]
    Store(String),
}

/// Fatal, run-level errors. Each maps to a distinct process exit status.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no files to upload in {}", .0.display())]
    NoFiles(PathBuf),

    #[error("cannot read archive directory {}: {source}", path.display())]
    ArchiveAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication failed creating remote folder: {0}")]
    FolderAuth(#[source] StorageError),

    #[error("failed to create remote folder: {0}")]
    FolderCreate(#[source] StorageError),

    #[error("run aborted by operator")]
    Aborted,

    #[error("dispatch stalled with {finished} of {total} files finished")]
    Stalled { finished: u64, total: u64 },

    #[error("finalization failed: {0}")]
    Finalize(#[from] ShareError),
}

impl RunError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::NoFiles(_)
            | RunError::ArchiveAccess { .. }
            | RunError::Io(_)
            | RunError::Stalled { .. } => 1,
            RunError::FolderAuth(_) => 2,
            RunError::FolderCreate(_) => 3,
            RunError::Aborted => 4,
            RunError::Finalize(_) => 5,
        }
    }
}

impl From<StorageError> for RunError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unauthorized(_) => RunError::FolderAuth(e),
            other => RunError::FolderCreate(other),
        }
    }
}
