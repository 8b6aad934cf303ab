//! Periodic progress display.
//!
//! The aggregator runs as its own tokio task. Once per interval it samples
//! [`RunStats`] and the [`ProgressBoard`], derives the transfer rate from the
//! byte delta since the previous sample and pushes the frame onto an
//! indicatif [`MultiProgress`]: one bar per handle plus a totals bar. It
//! holds only `Arc`s to the shared read-side state and never touches the
//! pool or the queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::stats::{ProgressBoard, RunStats, SlotSnapshot, StatsSnapshot};

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

const IDLE: &str = "idle";
const SLOT_TEMPLATE: &str = "{msg:30} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {percent:>3}%";
const TOTALS_TEMPLATE: &str =
    "[{elapsed_precise}] [{bar:30}] {bytes}/{total_bytes} ({percent}%) {msg}";

/// Everything one frame of the display shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressFrame {
    pub slots: Vec<SlotSnapshot>,
    pub totals: StatsSnapshot,
    /// Bytes per second since the previous sample.
    pub rate: f64,
    pub elapsed: Duration,
}

pub struct ProgressAggregator {
    stats: Arc<RunStats>,
    board: Arc<ProgressBoard>,
    interval: Duration,
    stop: CancellationToken,
    last_bytes: u64,
    last_sample: Instant,
}

impl ProgressAggregator {
    pub fn new(stats: Arc<RunStats>, board: Arc<ProgressBoard>, stop: CancellationToken) -> Self {
        Self {
            stats,
            board,
            interval: SAMPLE_INTERVAL,
            stop,
            last_bytes: 0,
            last_sample: Instant::now(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Take a snapshot and compute the rate against the previous one.
    pub fn sample(&mut self) -> ProgressFrame {
        let totals = self.stats.snapshot();
        let slots = self.board.snapshot();
        let in_flight: u64 = slots.iter().map(|s| s.sent).sum();
        let transferred = totals.bytes_uploaded + in_flight;

        let now = Instant::now();
        let dt = now.duration_since(self.last_sample).as_secs_f64();
        // A failed attempt drops its in-flight bytes, so the delta can be negative.
        let delta = transferred.saturating_sub(self.last_bytes);
        let rate = if dt > 0.0 { delta as f64 / dt } else { 0.0 };
        self.last_bytes = transferred;
        self.last_sample = now;

        ProgressFrame {
            slots,
            totals,
            rate,
            elapsed: self.stats.elapsed(),
        }
    }

    /// Run until every file is finished or `stop` is cancelled, drawing to
    /// stderr.
    pub fn spawn(self) -> JoinHandle<()> {
        self.spawn_with_target(ProgressDrawTarget::stderr())
    }

    pub fn spawn_with_target(mut self, target: ProgressDrawTarget) -> JoinHandle<()> {
        let display = ProgressDisplay::new(self.board.slot_count(), target);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let frame = self.sample();
                        display.show(&frame);
                        if frame.totals.files_finished >= frame.totals.files_total {
                            break;
                        }
                    }
                    _ = self.stop.cancelled() => break,
                }
            }
            display.finish();
            debug!("progress aggregator stopped");
        })
    }
}

/// One bar per transfer slot plus a totals bar, fed from sampled frames.
pub struct ProgressDisplay {
    multi: MultiProgress,
    slots: Vec<ProgressBar>,
    totals: ProgressBar,
}

impl ProgressDisplay {
    pub fn new(slots: usize, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let slot_style = style(SLOT_TEMPLATE).progress_chars("=> ");
        let slots = (0..slots)
            .map(|_| {
                let bar = multi.add(ProgressBar::new(0));
                bar.set_style(slot_style.clone());
                bar.set_message(IDLE);
                bar
            })
            .collect();
        let totals = multi.add(ProgressBar::new(0));
        totals.set_style(style(TOTALS_TEMPLATE).progress_chars("#>-"));
        Self {
            multi,
            slots,
            totals,
        }
    }

    pub fn show(&self, frame: &ProgressFrame) {
        for (slot, bar) in self.slots.iter().enumerate() {
            match frame.slots.iter().find(|s| s.slot == slot) {
                Some(busy) => {
                    bar.set_length(busy.size);
                    bar.set_position(busy.sent);
                    bar.set_message(busy.filename.clone());
                }
                None => {
                    bar.set_length(0);
                    bar.set_position(0);
                    bar.set_message(IDLE);
                }
            }
        }

        let t = &frame.totals;
        self.totals.set_length(t.bytes_total);
        self.totals.set_position(t.bytes_uploaded);
        self.totals.set_message(format!(
            "files {}/{}  {}/s",
            t.files_finished,
            t.files_total,
            HumanBytes(frame.rate as u64)
        ));
    }

    pub fn finish(&self) {
        for bar in &self.slots {
            bar.finish_and_clear();
        }
        self.totals.finish();
        let _ = self.multi.clear();
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::UploadTask;
    use std::path::PathBuf;

    fn frame(slots: Vec<SlotSnapshot>) -> ProgressFrame {
        ProgressFrame {
            slots,
            totals: StatsSnapshot {
                files_finished: 1,
                files_total: 3,
                bytes_uploaded: 2048,
                bytes_total: 4096,
            },
            rate: 1024.0,
            elapsed: Duration::from_secs(75),
        }
    }

    #[test]
    fn frame_positions_busy_bars_and_idles_the_rest() {
        let display = ProgressDisplay::new(2, ProgressDrawTarget::hidden());
        display.show(&frame(vec![SlotSnapshot {
            slot: 1,
            filename: "db.tar.gz".into(),
            size: 100,
            sent: 50,
        }]));

        assert_eq!(display.slots[0].message(), IDLE);
        assert_eq!(display.slots[0].position(), 0);
        assert_eq!(display.slots[1].message(), "db.tar.gz");
        assert_eq!(display.slots[1].length(), Some(100));
        assert_eq!(display.slots[1].position(), 50);

        assert_eq!(display.totals.length(), Some(4096));
        assert_eq!(display.totals.position(), 2048);
        let totals = display.totals.message();
        assert!(totals.starts_with("files 1/3"), "got {totals}");
        assert!(totals.ends_with("KiB/s"), "got {totals}");
    }

    #[test]
    fn finished_slot_returns_to_idle() {
        let display = ProgressDisplay::new(1, ProgressDrawTarget::hidden());
        display.show(&frame(vec![SlotSnapshot {
            slot: 0,
            filename: "a".into(),
            size: 10,
            sent: 10,
        }]));
        display.show(&frame(Vec::new()));
        assert_eq!(display.slots[0].message(), IDLE);
        assert_eq!(display.slots[0].position(), 0);
    }

    #[tokio::test]
    async fn sample_includes_in_flight_bytes_in_the_rate() {
        let stats = Arc::new(RunStats::new(2, 300));
        let board = Arc::new(ProgressBoard::new(2));
        board.begin(0, &UploadTask::new("a", PathBuf::from("a"), 200));
        board.update(0, 50);
        stats.record_success(100);

        let mut agg = ProgressAggregator::new(stats, board, CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let frame = agg.sample();
        assert_eq!(frame.totals.bytes_uploaded, 100);
        assert_eq!(frame.slots.len(), 1);
        assert!(frame.rate > 0.0);

        // Nothing moved since the last sample.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(agg.sample().rate, 0.0);
    }

    #[tokio::test]
    async fn aggregator_stops_when_all_files_are_finished() {
        let stats = Arc::new(RunStats::new(1, 10));
        let board = Arc::new(ProgressBoard::new(1));
        stats.record_success(10);
        let handle = ProgressAggregator::new(stats, board, CancellationToken::new())
            .with_interval(Duration::from_millis(10))
            .spawn_with_target(ProgressDrawTarget::hidden());
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("aggregator should exit on its own")
            .unwrap();
    }

    #[tokio::test]
    async fn aggregator_stops_when_told_to() {
        let stats = Arc::new(RunStats::new(5, 10));
        let board = Arc::new(ProgressBoard::new(1));
        let stop = CancellationToken::new();
        let handle = ProgressAggregator::new(stats, board, stop.clone())
            .with_interval(Duration::from_millis(10))
            .spawn_with_target(ProgressDrawTarget::hidden());
        stop.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("aggregator should stop on request")
            .unwrap();
    }
}
