//! Task repository port (driven/secondary port)
//!
//! Durable storage behind the sync queue. One record per pending task,
//! keyed by `(space, file, kind)`, holding everything needed to rebuild
//! scheduling state after a restart.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Every method is a single atomic transaction: a crash leaves either the
//!   previous or the new state, never a mix.
//! - Only the queue calls this port; nothing else writes task records.

use crate::domain::{Task, TaskKey, TaskKind};

/// Port trait for persisting sync tasks
#[async_trait::async_trait]
pub trait ITaskRepository: Send + Sync {
    /// Loads every persisted task, ordered by insertion sequence
    async fn load_all(&self) -> anyhow::Result<Vec<Task>>;

    /// Inserts or replaces `task`
    ///
    /// When `replaces` is set, the record of that kind for the same file is
    /// removed in the same transaction.
    async fn put(&self, task: &Task, replaces: Option<TaskKind>) -> anyhow::Result<()>;

    /// Removes the record for `key`; removing an absent record succeeds
    async fn delete(&self, key: &TaskKey) -> anyhow::Result<()>;
}
