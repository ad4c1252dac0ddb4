//! filesync Sync - Durable upload/delete engine
//!
//! Provides:
//! - A crash-recoverable task queue with one slot per file
//! - Content-addressed diffing so only blocks missing remotely are pushed
//! - A bounded worker pool with retry, backoff and dead-lettering
//! - Lock-light status snapshots and an event stream for observers
//!
//! ## Modules
//!
//! - [`queue`] - Durable Task Queue over an `ITaskRepository`
//! - [`content`] - Read-only adapter over the local block store
//! - [`transfer`] - Per-task diff-and-push / delete protocol
//! - [`scheduler`] - Worker pool draining the queue
//! - [`status`] - Status reporter
//! - [`file_sync`] - `FileSync`, the public entry point
//!
//! ## Flow
//!
//! ```text
//! add_file / remove_file ──→ TaskQueue (persist, then memory)
//!                                 │ dequeue
//!                           SyncScheduler workers
//!                                 │
//!              ContentStore + IRemoteStore (Transfer)
//!                                 │
//!             complete / fail / dead_letter ──→ SyncEvent broadcast
//! ```

pub mod content;
pub mod file_sync;
pub mod queue;
pub mod scheduler;
pub mod status;
pub mod transfer;

use std::time::Duration;

use filesync_core::domain::Cid;
use filesync_core::ports::RemoteError;
use thiserror::Error;

pub use file_sync::FileSync;
pub use queue::{EnqueueOutcome, FailOutcome, TaskQueue};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use status::StatusReporter;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The durable queue store failed; the triggering operation had no effect
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A remote call failed
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Blocks reachable from the file are absent from the local store
    #[error("{} block(s) missing from local store", .0.len())]
    BlockMissing(Vec<Cid>),

    /// The file identifier does not name a root content address
    #[error("Invalid file reference: {0}")]
    InvalidFileId(String),

    /// The local block store failed to answer
    #[error("Local store error: {0}")]
    LocalStore(String),

    /// A local block is unreadable or no longer matches its address
    #[error("Corrupted local content: {0}")]
    CorruptContent(String),

    /// A remote call exceeded the configured call timeout
    #[error("Remote call timed out")]
    Timeout,

    /// The attempt was aborted by shutdown
    #[error("Cancelled")]
    Cancelled,

    /// The task panicked inside its worker
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
}

impl SyncError {
    /// Whether the task should be retried after a backoff delay
    ///
    /// `Cancelled` is neither retried nor fatal; the task simply goes back
    /// to pending.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_retryable(),
            Self::LocalStore(_) | Self::Timeout | Self::WorkerPanic(_) => true,
            Self::Persistence(_)
            | Self::BlockMissing(_)
            | Self::InvalidFileId(_)
            | Self::CorruptContent(_)
            | Self::Cancelled => false,
        }
    }

    /// Minimum retry delay requested by the remote, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Remote(e) => e.retry_after(),
            _ => None,
        }
    }

    pub(crate) fn persistence(e: anyhow::Error) -> Self {
        Self::Persistence(format!("{e:#}"))
    }
}
