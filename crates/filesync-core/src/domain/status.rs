//! Read-only views of the sync queue for observers
//!
//! These types are recomputed from the live queue on every query and never
//! cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Task, TaskKey};

/// Sync state of a single file as seen by the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileSyncState {
    /// Waiting for a worker
    Pending,
    /// A worker is executing the task right now
    InFlight,
    /// Failed transiently, retried after `until`
    BackedOff { until: DateTime<Utc> },
    /// Failed permanently or exhausted its attempts
    DeadLettered { error: String },
}

/// Point-in-time description of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub key: TaskKey,
    pub state: FileSyncState,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl TaskSnapshot {
    /// Describes `task` at `now`
    pub fn of(task: &Task, in_flight: bool, now: DateTime<Utc>) -> Self {
        let state = if task.dead_lettered {
            FileSyncState::DeadLettered {
                error: task.last_error.clone().unwrap_or_default(),
            }
        } else if in_flight {
            FileSyncState::InFlight
        } else {
            match task.next_attempt_at {
                Some(until) if until > now => FileSyncState::BackedOff { until },
                _ => FileSyncState::Pending,
            }
        };

        Self {
            key: task.key.clone(),
            state,
            attempts: task.attempts,
            enqueued_at: task.enqueued_at,
            last_error: task.last_error.clone(),
        }
    }
}

/// Aggregate queue status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Pending tasks, including in-flight and backed-off ones; dead letters excluded
    pub queue_len: usize,
    /// Tasks currently held by a worker
    pub in_flight: usize,
    /// Tasks waiting out a retry delay
    pub backed_off: usize,
    /// Tasks that will not be retried without operator action
    pub dead_lettered: Vec<TaskSnapshot>,
}

impl SyncStatus {
    /// True once nothing is left to do (dead letters aside)
    pub fn is_idle(&self) -> bool {
        self.queue_len == 0
    }
}
