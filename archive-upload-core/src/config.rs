use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Default number of concurrent transfers.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// What one run uploads, where to, and who gets the link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub archive_dir: PathBuf,
    pub folder_prefix: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub recipients: Vec<String>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl SessionConfig {
    /// Remote folder name for a run started on `date`: `<prefix>-<YYYY-MM-DD>`.
    pub fn folder_name(&self, date: NaiveDate) -> String {
        format!("{}-{}", self.folder_prefix, date.format("%Y-%m-%d"))
    }

    pub fn trace_loaded(&self) {
        info!(
            archive_dir = %self.archive_dir.display(),
            folder_prefix = %self.folder_prefix,
            concurrency = self.concurrency,
            recipients = self.recipients.len(),
            "Loaded SessionConfig"
        );
        debug!(?self, "SessionConfig loaded (full debug)");
    }
}
