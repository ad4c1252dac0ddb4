//! Status reporter
//!
//! Answers "how much work is left" from the queue's in-memory view; it never
//! touches the store, so a query cannot fail or block on I/O.

use std::sync::Arc;

use filesync_core::domain::{FileKey, SyncStatus, TaskSnapshot};

use crate::queue::TaskQueue;

/// Read-only handle onto a [`TaskQueue`]
#[derive(Clone)]
pub struct StatusReporter {
    queue: Arc<TaskQueue>,
}

impl StatusReporter {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    /// Aggregate status; `queue_len` counts pending, in-flight and backed-off
    /// tasks
    pub fn sync_status(&self) -> SyncStatus {
        self.queue.snapshot()
    }

    /// State of the task occupying `file`'s slot, or `None` if it is idle
    pub fn file_status(&self, file: &FileKey) -> Option<TaskSnapshot> {
        self.queue.file_state(file)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}
