//! The upload reactor loop.
//!
//! Each cycle:
//!   - fill: move queued tasks onto free handles and start their uploads
//!   - drive/drain: poll the in-flight set without blocking and settle every
//!     completion that is ready
//!   - publish: copy each busy handle's byte cursor onto the progress board
//!   - wait: block for the next completion, bounded by a short timeout
//!
//! The in-flight set is a `FuturesUnordered`; the dispatcher is its only
//! poller, so the pool, the queue and the stats have a single writer.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::contract::{PutRequest, Transport};
use crate::error::{RunError, TransferError};
use crate::pool::{HandlePool, TransferHandle};
use crate::retry::{Disposition, RetryPolicy};
use crate::stats::{ProgressBoard, RunStats};
use crate::task::{TaskQueue, UploadTask};

/// Upper bound on a single wait for I/O completions.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

type Completion = (usize, Result<(), TransferError>);
type InFlight<'t> = FuturesUnordered<BoxFuture<'t, Completion>>;

/// Terminal outcome of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub filename: String,
    pub size: u64,
    /// Attempts made, including the final one.
    pub attempts: u32,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub uploaded: Vec<FileOutcome>,
    /// Files given up on after exhausting their attempts. They were never
    /// uploaded.
    pub abandoned: Vec<FileOutcome>,
    pub bytes_uploaded: u64,
    pub elapsed: Duration,
    /// Highest number of simultaneously busy handles.
    pub peak_busy: usize,
}

/// Everything the dispatcher owns for one run.
pub struct RunContext {
    queue: TaskQueue,
    pool: HandlePool,
    stats: Arc<RunStats>,
    board: Arc<ProgressBoard>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(tasks: Vec<UploadTask>, concurrency: usize, cancel: CancellationToken) -> Self {
        let queue = TaskQueue::new(tasks);
        let stats = Arc::new(RunStats::new(queue.len() as u64, queue.total_bytes()));
        let pool = HandlePool::new(concurrency);
        let board = Arc::new(ProgressBoard::new(pool.capacity()));
        Self {
            queue,
            pool,
            stats,
            board,
            policy: RetryPolicy::default(),
            cancel,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Read-only handle on the counters, for the progress aggregator.
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Read-only handle on per-slot progress, for the progress aggregator.
    pub fn board(&self) -> Arc<ProgressBoard> {
        Arc::clone(&self.board)
    }
}

pub struct Dispatcher<'t, T: Transport + ?Sized> {
    transport: &'t T,
    folder: String,
    ctx: RunContext,
    wait: Duration,
    handles: Vec<Option<TransferHandle>>,
    report: RunReport,
}

impl<'t, T: Transport + ?Sized> Dispatcher<'t, T> {
    pub fn new(transport: &'t T, folder: impl Into<String>, ctx: RunContext) -> Self {
        let handles = (0..ctx.pool.capacity()).map(|_| None).collect();
        Self {
            transport,
            folder: folder.into(),
            ctx,
            wait: WAIT_TIMEOUT,
            handles,
            report: RunReport::default(),
        }
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Drive every task to a terminal state.
    ///
    /// Returns [`RunError::Aborted`] as soon as a transfer reports
    /// cancellation; all in-flight transfers are dropped and their handles
    /// released before returning.
    pub async fn run(mut self) -> Result<RunReport, RunError> {
        let mut in_flight: InFlight<'t> = FuturesUnordered::new();
        info!(
            folder = %self.folder,
            files = self.ctx.stats.files_total(),
            bytes = self.ctx.stats.bytes_total(),
            concurrency = self.ctx.pool.capacity(),
            "[DISPATCH] starting upload run"
        );

        while !self.ctx.stats.is_complete() {
            if self.ctx.cancel.is_cancelled() {
                if in_flight.is_empty() {
                    return Err(self.abort(&mut in_flight));
                }
            } else {
                self.fill(&mut in_flight);
            }

            while let Some(Some((slot, result))) = in_flight.next().now_or_never() {
                if self.complete(slot, result).is_break() {
                    return Err(self.abort(&mut in_flight));
                }
            }
            self.publish();

            if self.ctx.stats.is_complete() {
                break;
            }

            match tokio::time::timeout(self.wait, in_flight.next()).await {
                Ok(Some((slot, result))) => {
                    if self.complete(slot, result).is_break() {
                        return Err(self.abort(&mut in_flight));
                    }
                }
                Ok(None) if self.ctx.queue.is_empty() => {
                    let finished = self.ctx.stats.files_finished();
                    let total = self.ctx.stats.files_total();
                    error!(
                        finished,
                        total, "[DISPATCH] nothing queued or in flight but run incomplete"
                    );
                    return Err(RunError::Stalled { finished, total });
                }
                Ok(None) | Err(_) => {}
            }
        }

        self.report.bytes_uploaded = self.ctx.stats.bytes_uploaded();
        self.report.elapsed = self.ctx.stats.elapsed();
        info!(
            uploaded = self.report.uploaded.len(),
            abandoned = self.report.abandoned.len(),
            bytes = self.report.bytes_uploaded,
            elapsed_secs = self.report.elapsed.as_secs(),
            "[DISPATCH] upload run finished"
        );
        Ok(self.report)
    }

    fn fill(&mut self, in_flight: &mut InFlight<'t>) {
        while self.ctx.pool.has_free() && !self.ctx.queue.is_empty() {
            let Some(mut handle) = self.ctx.pool.acquire() else {
                break;
            };
            let Some(task) = self.ctx.queue.pop_front() else {
                self.ctx.pool.reset_and_release(handle);
                break;
            };
            let slot = handle.slot();
            let filename = task.filename.clone();
            let path = task.path.clone();
            let size = task.size;
            debug!(file = %filename, slot, attempt = task.attempts + 1, "[DISPATCH] starting upload");

            self.ctx.board.begin(slot, &task);
            let cursor = handle.assign(task);
            let req = PutRequest {
                folder: self.folder.clone(),
                filename,
                path,
                size,
                cursor,
            };
            in_flight.push(self.start(slot, req));
            self.handles[slot] = Some(handle);
            self.report.peak_busy = self.report.peak_busy.max(self.ctx.pool.busy());
        }
    }

    fn start(&self, slot: usize, req: PutRequest) -> BoxFuture<'t, Completion> {
        let transport: &'t T = self.transport;
        let cancel = self.ctx.cancel.clone();
        async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransferError::Cancelled),
                r = transport.put_file(req) => r,
            };
            (slot, result)
        }
        .boxed()
    }

    fn complete(&mut self, slot: usize, result: Result<(), TransferError>) -> ControlFlow<()> {
        let Some(handle) = self.handles.get_mut(slot).and_then(Option::take) else {
            error!(slot, "[DISPATCH] completion for a slot with no busy handle");
            return ControlFlow::Continue(());
        };
        self.ctx.board.clear(slot);
        let Some(mut task) = self.ctx.pool.reset_and_release(handle) else {
            return ControlFlow::Continue(());
        };

        match result {
            Ok(()) => {
                self.ctx.stats.record_success(task.size);
                info!(
                    file = %task.filename,
                    size = task.size,
                    finished = self.ctx.stats.files_finished(),
                    total = self.ctx.stats.files_total(),
                    "[DISPATCH] upload complete"
                );
                self.report.uploaded.push(FileOutcome {
                    attempts: task.attempts + 1,
                    filename: task.filename,
                    size: task.size,
                });
            }
            Err(err) => match self.ctx.policy.classify(&mut task, &err) {
                Disposition::Retry => self.ctx.queue.push_front(task),
                Disposition::Abandon => {
                    self.ctx.stats.record_abandoned();
                    self.report.abandoned.push(FileOutcome {
                        attempts: task.attempts,
                        filename: task.filename,
                        size: task.size,
                    });
                }
                Disposition::Abort => return ControlFlow::Break(()),
            },
        }
        ControlFlow::Continue(())
    }

    fn publish(&self) {
        for handle in self.handles.iter().flatten() {
            self.ctx.board.update(handle.slot(), handle.bytes_so_far());
        }
    }

    fn abort(&mut self, in_flight: &mut InFlight<'t>) -> RunError {
        let dropped = in_flight.len();
        // Dropping the futures closes their files and connections.
        *in_flight = FuturesUnordered::new();
        for (slot, entry) in self.handles.iter_mut().enumerate() {
            if let Some(handle) = entry.take() {
                self.ctx.pool.reset_and_release(handle);
                self.ctx.board.clear(slot);
            }
        }
        error!(
            dropped,
            finished = self.ctx.stats.files_finished(),
            total = self.ctx.stats.files_total(),
            "[DISPATCH] run aborted by operator"
        );
        RunError::Aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockTransport;
    use std::path::PathBuf;

    #[tokio::test]
    async fn lost_tasks_end_the_run_with_an_error_not_a_report() {
        let mut ctx = RunContext::new(
            vec![UploadTask::new("a", PathBuf::from("a"), 1)],
            1,
            CancellationToken::new(),
        );
        // Drop the only task behind the stats' back.
        ctx.queue.pop_front();
        let transport = MockTransport::new();

        let err = Dispatcher::new(&transport, "dst", ctx)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Stalled {
                finished: 0,
                total: 1
            }
        ));
        assert_eq!(err.exit_code(), 1);
    }
}
