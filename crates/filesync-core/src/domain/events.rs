//! Notifications emitted by the sync engine as tasks reach an outcome
//!
//! Enqueuing returns as soon as the task is persisted; these events are the
//! only push-style way to learn what happened to it afterwards.

use serde::{Deserialize, Serialize};

use super::task::{TaskKey, TaskKind};

/// Outcome of one task attempt, or of a task being superseded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The task finished and was removed from the queue
    Completed { key: TaskKey },
    /// A transient failure; the task runs again after `delay_ms`
    Retrying {
        key: TaskKey,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// The task will not run again without operator action
    DeadLettered { key: TaskKey, error: String },
    /// A pending task was replaced by a request of the opposite kind
    Cancelled { key: TaskKey, replaced_by: TaskKind },
}

impl SyncEvent {
    /// The task this event is about
    pub fn key(&self) -> &TaskKey {
        match self {
            Self::Completed { key }
            | Self::Retrying { key, .. }
            | Self::DeadLettered { key, .. }
            | Self::Cancelled { key, .. } => key,
        }
    }
}
