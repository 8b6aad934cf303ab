//! Decides what happens to a task after a failed upload attempt.

use tracing::{error, warn};

use crate::error::TransferError;
use crate::task::UploadTask;

/// Attempts a file gets before it is abandoned.
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Put the task back at the front of the queue.
    Retry,
    /// Give up on the task; it counts as finished without bytes.
    Abandon,
    /// Stop the whole run.
    Abort,
}

impl RetryPolicy {
    /// Record the failure on `task` and classify it.
    pub fn classify(&self, task: &mut UploadTask, err: &TransferError) -> Disposition {
        if matches!(err, TransferError::Cancelled) {
            error!(file = %task.filename, "[RETRY] transfer cancelled by operator, aborting run");
            return Disposition::Abort;
        }

        task.attempts += 1;
        if task.attempts < self.max_attempts {
            warn!(
                file = %task.filename,
                attempt = task.attempts,
                error = %err,
                "[RETRY] upload failed, re-queueing"
            );
            Disposition::Retry
        } else {
            error!(
                file = %task.filename,
                attempts = task.attempts,
                error = %err,
                "[RETRY] upload failed too many times, abandoning file"
            );
            Disposition::Abandon
        }
    }
}
