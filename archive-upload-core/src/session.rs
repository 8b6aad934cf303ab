//! High-level run: bootstrap → dispatch → finalize.
//!
//! This module ties the pieces of one archive upload together:
//!   - Lists the archive directory and creates the dated remote folder
//!   - Dispatches every file through the bounded-concurrency [`Dispatcher`],
//!     with the progress aggregator sampling alongside
//!   - Rotates the API token and shares the folder with the recipients
//!
//! # Error Handling
//! Bootstrap and finalization failures are fatal and returned as-is; per-file
//! upload failures are retried inside the dispatcher and only surface as the
//! `abandoned` list of the report. Operator cancellation surfaces as
//! [`RunError::Aborted`] in every phase, including a pending folder creation
//! or finalization call.

use std::future::Future;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bootstrap::{create_target, list_archive, FolderTarget};
use crate::config::SessionConfig;
use crate::contract::{CredentialStore, RemoteStorage, ShareService, TokenExchange, Transport};
use crate::dispatcher::{Dispatcher, RunContext, RunReport};
use crate::error::RunError;
use crate::finalize::finalize;
use crate::progress::ProgressAggregator;

/// The external services a run talks to.
pub struct Collaborators<'a> {
    pub transport: &'a dyn Transport,
    pub storage: &'a dyn RemoteStorage,
    pub tokens: &'a dyn TokenExchange,
    pub credentials: &'a dyn CredentialStore,
    pub share: &'a dyn ShareService,
}

#[derive(Debug)]
pub struct SessionReport {
    pub target: FolderTarget,
    pub run: RunReport,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Calendar date used for the remote folder name.
    pub run_date: NaiveDate,
    pub show_progress: bool,
    pub cancel: CancellationToken,
}

impl SessionOptions {
    pub fn today(cancel: CancellationToken) -> Self {
        Self {
            run_date: chrono::Local::now().date_naive(),
            show_progress: true,
            cancel,
        }
    }
}

pub async fn run_session(
    config: &SessionConfig,
    collab: &Collaborators<'_>,
    options: SessionOptions,
) -> Result<SessionReport, RunError> {
    info!("[RUN] starting archive upload session");

    let cancel = &options.cancel;
    let tasks = until_cancelled(cancel, "bootstrap", list_archive(&config.archive_dir)).await?;
    let folder = config.folder_name(options.run_date);
    let mut target =
        until_cancelled(cancel, "bootstrap", create_target(collab.storage, &folder)).await?;

    let ctx = RunContext::new(tasks, config.concurrency, options.cancel.clone());
    let stop_progress = CancellationToken::new();
    let progress = options.show_progress.then(|| {
        ProgressAggregator::new(ctx.stats(), ctx.board(), stop_progress.clone()).spawn()
    });

    let dispatched = Dispatcher::new(collab.transport, target.name.clone(), ctx)
        .run()
        .await;

    stop_progress.cancel();
    if let Some(handle) = progress {
        let _ = handle.await;
    }
    let run = dispatched?;

    for file in &run.abandoned {
        warn!(
            file = %file.filename,
            attempts = file.attempts,
            "[RUN] file was not uploaded"
        );
    }

    until_cancelled(
        cancel,
        "finalize",
        finalize(
            collab.tokens,
            collab.credentials,
            collab.share,
            &mut target,
            &config.recipients,
        ),
    )
    .await?;

    info!(
        folder = %target.name,
        uploaded = run.uploaded.len(),
        abandoned = run.abandoned.len(),
        link = target.share_link.as_deref().unwrap_or_default(),
        "[RUN] session complete"
    );
    Ok(SessionReport { target, run })
}

/// Run `step` unless the operator interrupts first; the pending call is dropped.
async fn until_cancelled<T, F>(
    cancel: &CancellationToken,
    phase: &'static str,
    step: F,
) -> Result<T, RunError>
where
    F: Future<Output = Result<T, RunError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            error!(phase, "[RUN] interrupted, abandoning pending call");
            Err(RunError::Aborted)
        }
        result = step => result,
    }
}
