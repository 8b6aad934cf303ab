//! Pre-dispatch steps: read the archive listing and make sure the remote
//! folder exists.

use std::io::ErrorKind;
use std::path::Path;

use tracing::{error, info, warn};

use crate::contract::{FolderOutcome, RemoteStorage};
use crate::error::RunError;
use crate::task::UploadTask;

/// The dated remote folder a run uploads into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderTarget {
    pub name: String,
    /// Remote identifier, resolved at finalization.
    pub id: Option<String>,
    /// Share link, created at finalization.
    pub share_link: Option<String>,
}

impl FolderTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            share_link: None,
        }
    }
}

/// List the regular files of `dir`, sorted by name.
///
/// An empty directory is an error: there is nothing to do.
pub async fn list_archive(dir: &Path) -> Result<Vec<UploadTask>, RunError> {
    let access = |source: std::io::Error| {
        if source.kind() == ErrorKind::PermissionDenied {
            RunError::ArchiveAccess {
                path: dir.to_path_buf(),
                source,
            }
        } else {
            RunError::Io(source)
        }
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(access)?;
    let mut tasks = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(access)? {
        let meta = entry.metadata().await.map_err(access)?;
        if !meta.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!(path = %entry.path().display(), "[BOOTSTRAP] skipping file with non UTF-8 name");
            continue;
        };
        tasks.push(UploadTask::new(name, entry.path(), meta.len()));
    }

    if tasks.is_empty() {
        error!(dir = %dir.display(), "[BOOTSTRAP] archive directory is empty");
        return Err(RunError::NoFiles(dir.to_path_buf()));
    }
    tasks.sort_by(|a, b| a.filename.cmp(&b.filename));
    info!(
        dir = %dir.display(),
        files = tasks.len(),
        bytes = tasks.iter().map(|t| t.size).sum::<u64>(),
        "[BOOTSTRAP] archive listed"
    );
    Ok(tasks)
}

/// Create the remote folder. An existing folder counts as success.
pub async fn create_target<S>(storage: &S, name: &str) -> Result<FolderTarget, RunError>
where
    S: RemoteStorage + ?Sized,
{
    match storage.create_folder(name).await {
        Ok(FolderOutcome::Created) => {
            info!(folder = %name, "[BOOTSTRAP] remote folder created");
        }
        Ok(FolderOutcome::AlreadyExists) => {
            info!(folder = %name, "[BOOTSTRAP] remote folder already exists");
        }
        Err(e) => {
            error!(folder = %name, error = %e, "[BOOTSTRAP] failed to create remote folder");
            return Err(RunError::from(e));
        }
    }
    Ok(FolderTarget::new(name))
}
