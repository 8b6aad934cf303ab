//! State shared between the dispatcher (the only writer) and the progress
//! aggregator (a reader). Every scalar is an atomic so a reader may see a
//! slightly stale value but never a torn one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::task::UploadTask;

#[derive(Debug)]
pub struct RunStats {
    files_finished: AtomicU64,
    files_total: u64,
    bytes_uploaded: AtomicU64,
    bytes_total: u64,
    started: Instant,
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub files_finished: u64,
    pub files_total: u64,
    pub bytes_uploaded: u64,
    pub bytes_total: u64,
}

impl RunStats {
    pub fn new(files_total: u64, bytes_total: u64) -> Self {
        Self {
            files_finished: AtomicU64::new(0),
            files_total,
            bytes_uploaded: AtomicU64::new(0),
            bytes_total,
            started: Instant::now(),
        }
    }

    /// A file finished uploading: credit its bytes and count it.
    pub fn record_success(&self, size: u64) {
        self.bytes_uploaded.fetch_add(size, Ordering::Relaxed);
        self.files_finished.fetch_add(1, Ordering::Release);
    }

    /// A file was given up on: count it, credit nothing.
    pub fn record_abandoned(&self) {
        self.files_finished.fetch_add(1, Ordering::Release);
    }

    pub fn files_finished(&self) -> u64 {
        self.files_finished.load(Ordering::Acquire)
    }

    pub fn files_total(&self) -> u64 {
        self.files_total
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded.load(Ordering::Relaxed)
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    pub fn is_complete(&self) -> bool {
        self.files_finished() >= self.files_total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_finished: self.files_finished(),
            files_total: self.files_total,
            bytes_uploaded: self.bytes_uploaded(),
            bytes_total: self.bytes_total,
        }
    }
}

#[derive(Debug, Default)]
struct SlotProgress {
    filename: RwLock<Option<String>>,
    size: AtomicU64,
    sent: AtomicU64,
}

/// Progress of one busy handle as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub slot: usize,
    pub filename: String,
    pub size: u64,
    pub sent: u64,
}

/// Per-handle progress published by the dispatcher after each cycle.
#[derive(Debug)]
pub struct ProgressBoard {
    slots: Vec<SlotProgress>,
}

impl ProgressBoard {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: (0..slots).map(|_| SlotProgress::default()).collect(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn begin(&self, slot: usize, task: &UploadTask) {
        if let Some(s) = self.slots.get(slot) {
            s.sent.store(0, Ordering::Relaxed);
            s.size.store(task.size, Ordering::Relaxed);
            *s.filename.write().unwrap_or_else(PoisonError::into_inner) =
                Some(task.filename.clone());
        }
    }

    pub fn update(&self, slot: usize, sent: u64) {
        if let Some(s) = self.slots.get(slot) {
            s.sent.store(sent, Ordering::Relaxed);
        }
    }

    pub fn clear(&self, slot: usize) {
        if let Some(s) = self.slots.get(slot) {
            *s.filename.write().unwrap_or_else(PoisonError::into_inner) = None;
            s.sent.store(0, Ordering::Relaxed);
            s.size.store(0, Ordering::Relaxed);
        }
    }

    /// Occupied slots only, in slot order.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, s)| {
                let filename = s
                    .filename
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()?;
                Some(SlotSnapshot {
                    slot,
                    filename,
                    size: s.size.load(Ordering::Relaxed),
                    sent: s.sent.load(Ordering::Relaxed),
                })
            })
            .collect()
    }
}
