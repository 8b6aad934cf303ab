//! Fixed-size pool of transfer handles.
//!
//! A handle is either free (sitting in the pool) or busy (owned by the
//! dispatcher and carrying exactly one task). Handles are only created by the
//! pool and are moved in and out by value, so a handle cannot be released
//! twice or be busy for two tasks at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error};

use crate::task::UploadTask;

/// Shared byte counter for one in-flight transfer: the file read cursor.
#[derive(Debug, Clone, Default)]
pub struct ByteCursor(Arc<AtomicU64>);

impl ByteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn position(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Task association of a busy handle.
#[derive(Debug)]
pub struct BusyTransfer {
    pub task: UploadTask,
    pub cursor: ByteCursor,
}

#[derive(Debug)]
pub enum HandleState {
    Free,
    Busy(BusyTransfer),
}

/// One concurrent transfer slot.
#[derive(Debug)]
pub struct TransferHandle {
    slot: usize,
    state: HandleState,
}

impl TransferHandle {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            state: HandleState::Free,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, HandleState::Busy(_))
    }

    pub fn task(&self) -> Option<&UploadTask> {
        match &self.state {
            HandleState::Busy(busy) => Some(&busy.task),
            HandleState::Free => None,
        }
    }

    /// Bytes read from the file so far, zero when free.
    pub fn bytes_so_far(&self) -> u64 {
        match &self.state {
            HandleState::Busy(busy) => busy.cursor.position(),
            HandleState::Free => 0,
        }
    }

    /// Associate `task` with this handle and return its fresh cursor.
    pub fn assign(&mut self, task: UploadTask) -> ByteCursor {
        let cursor = ByteCursor::new();
        self.state = HandleState::Busy(BusyTransfer {
            task,
            cursor: cursor.clone(),
        });
        cursor
    }

    fn reset(&mut self) -> Option<UploadTask> {
        match std::mem::replace(&mut self.state, HandleState::Free) {
            HandleState::Busy(busy) => Some(busy.task),
            HandleState::Free => None,
        }
    }
}

#[derive(Debug)]
pub struct HandlePool {
    capacity: usize,
    free: Vec<TransferHandle>,
}

impl HandlePool {
    /// Create a pool of `capacity` handles; a zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        // Reversed so that acquire hands out slot 0 first.
        let free = (0..capacity).rev().map(TransferHandle::new).collect();
        Self { capacity, free }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    /// Number of handles currently outside the pool.
    pub fn busy(&self) -> usize {
        self.capacity.saturating_sub(self.free.len())
    }

    /// Take a free handle out of the pool.
    pub fn acquire(&mut self) -> Option<TransferHandle> {
        let handle = self.free.pop()?;
        debug!(slot = handle.slot, busy = self.busy(), "handle acquired");
        Some(handle)
    }

    /// Clear the handle's task association and cursor and return it to the
    /// pool. Yields the task it was carrying.
    ///
    /// A handle whose slot is out of range or already free is dropped with an
    /// error instead of being pooled, so the pool never grows past capacity.
    pub fn reset_and_release(&mut self, mut handle: TransferHandle) -> Option<UploadTask> {
        let task = handle.reset();
        let slot = handle.slot;
        if slot >= self.capacity || self.free.iter().any(|h| h.slot == slot) {
            error!(
                slot,
                capacity = self.capacity,
                "rejected release of a handle that is not busy in this pool"
            );
            return task;
        }
        debug!(slot, "handle released");
        self.free.push(handle);
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn pool_never_hands_out_more_than_capacity() {
        let mut pool = HandlePool::new(2);
        let a = pool.acquire().expect("first handle");
        let b = pool.acquire().expect("second handle");
        assert!(pool.acquire().is_none());
        assert_eq!(pool.busy(), 2);
        assert_ne!(a.slot(), b.slot());

        pool.reset_and_release(a);
        assert_eq!(pool.busy(), 1);
        assert!(pool.has_free());
        pool.reset_and_release(b);
        assert_eq!(pool.busy(), 0);
    }

    #[test]
    fn release_returns_the_task_and_clears_state() {
        let mut pool = HandlePool::new(1);
        let mut handle = pool.acquire().unwrap();
        let cursor = handle.assign(UploadTask::new("f", PathBuf::from("f"), 5));
        cursor.advance(3);
        assert!(handle.is_busy());
        assert_eq!(handle.bytes_so_far(), 3);

        let task = pool.reset_and_release(handle).expect("task returned");
        assert_eq!(task.filename, "f");

        let handle = pool.acquire().unwrap();
        assert!(!handle.is_busy());
        assert_eq!(handle.bytes_so_far(), 0);
        assert!(handle.task().is_none());
    }

    #[test]
    fn releasing_into_a_free_slot_does_not_grow_the_pool() {
        let mut a = HandlePool::new(1);
        let mut b = HandlePool::new(1);

        let mut stray = a.acquire().unwrap();
        stray.assign(UploadTask::new("x", PathBuf::from("x"), 1));
        let task = b.reset_and_release(stray);
        assert_eq!(task.map(|t| t.filename).as_deref(), Some("x"));
        assert_eq!(b.busy(), 0);
        assert!(b.acquire().is_some());
        assert!(b.acquire().is_none());
    }

    #[test]
    fn releasing_an_out_of_range_slot_is_rejected() {
        let mut wide = HandlePool::new(3);
        let _ = wide.acquire();
        let _ = wide.acquire();
        let slot_two = wide.acquire().unwrap();
        assert_eq!(slot_two.slot(), 2);

        let mut narrow = HandlePool::new(1);
        let _held = narrow.acquire().unwrap();
        narrow.reset_and_release(slot_two);
        assert_eq!(narrow.busy(), 1);
        assert!(!narrow.has_free());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let pool = HandlePool::new(0);
        assert_eq!(pool.capacity(), 1);
    }
}
