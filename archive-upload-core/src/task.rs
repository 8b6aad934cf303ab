use std::collections::VecDeque;
use std::path::PathBuf;

/// One file pending or undergoing upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    /// Failed attempts so far.
    pub attempts: u32,
}

impl UploadTask {
    pub fn new(filename: impl Into<String>, path: PathBuf, size: u64) -> Self {
        Self {
            filename: filename.into(),
            path,
            size,
            attempts: 0,
        }
    }
}

/// Ordered backlog of tasks waiting for a free handle.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<UploadTask>,
}

impl TaskQueue {
    pub fn new(tasks: impl IntoIterator<Item = UploadTask>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
        }
    }

    pub fn pop_front(&mut self) -> Option<UploadTask> {
        self.tasks.pop_front()
    }

    /// Put a task at the head of the queue so it is dispatched next.
    pub fn push_front(&mut self, task: UploadTask) {
        self.tasks.push_front(task);
    }

    pub fn push_back(&mut self, task: UploadTask) {
        self.tasks.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.tasks.iter().map(|t| t.size).sum()
    }
}
