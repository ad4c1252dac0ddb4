//! Sync tasks and their retry bookkeeping
//!
//! A [`Task`] is one unit of pending work for a file in a space. At most one
//! task exists per [`FileKey`]: enqueuing the opposite kind replaces the
//! pending one (a delete cancels a pending upload and vice versa).
//!
//! ## State Machine
//!
//! ```text
//! Pending ──dequeue──→ InFlight ──success──→ (removed)
//!    ↑                    │
//!    └──backoff elapsed── BackedOff ←──retryable failure
//!                         │
//!                         └──attempts exhausted / fatal──→ DeadLettered
//! ```
//!
//! `InFlight` is never persisted: after a crash the task is simply `Pending`.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{FileId, SpaceId};

// ============================================================================
// TaskKind
// ============================================================================

/// What a task does to the remote copy of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Push every block of the file that the remote does not have yet
    Upload,
    /// Remove the file from the remote
    Delete,
}

impl TaskKind {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Delete => "delete",
        }
    }

    /// The kind that a new request of this kind cancels
    pub fn opposite(&self) -> Self {
        match self {
            Self::Upload => Self::Delete,
            Self::Delete => Self::Upload,
        }
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "delete" => Ok(Self::Delete),
            other => Err(DomainError::InvalidTaskKind(other.to_string())),
        }
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Identifies a file within a space; the queue keeps one slot per file key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey {
    pub space: SpaceId,
    pub file: FileId,
}

impl FileKey {
    pub fn new(space: SpaceId, file: FileId) -> Self {
        Self { space, file }
    }

    pub fn with_kind(self, kind: TaskKind) -> TaskKey {
        TaskKey {
            space: self.space,
            file: self.file,
            kind,
        }
    }
}

impl Display for FileKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.space, self.file)
    }
}

/// Unique identity of a task: `(space, file, kind)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub space: SpaceId,
    pub file: FileId,
    pub kind: TaskKind,
}

impl TaskKey {
    pub fn new(space: SpaceId, file: FileId, kind: TaskKind) -> Self {
        Self { space, file, kind }
    }

    pub fn file_key(&self) -> FileKey {
        FileKey::new(self.space.clone(), self.file.clone())
    }
}

impl Display for TaskKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind, self.space, self.file)
    }
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// Exponential backoff with a cap and a bounded number of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which a task is dead-lettered
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after the `attempt`-th failure (1-based)
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// A unit of pending sync work, as persisted by the task repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub key: TaskKey,
    /// Insertion order; lower runs first among eligible tasks
    pub seq: i64,
    /// Failed attempts so far
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Not eligible before this instant (backoff); `None` means immediately
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Terminal failure, kept for operator visibility until revived
    pub dead_lettered: bool,
    /// Bumped whenever the slot is re-requested while a worker may hold it;
    /// in-memory only
    #[serde(skip)]
    pub revision: u64,
}

impl Task {
    /// Creates a fresh pending task
    pub fn new(key: TaskKey, seq: i64, now: DateTime<Utc>) -> Self {
        Self {
            key,
            seq,
            attempts: 0,
            enqueued_at: now,
            updated_at: now,
            next_attempt_at: None,
            last_error: None,
            dead_lettered: false,
            revision: 0,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.key.kind
    }

    pub fn file_key(&self) -> FileKey {
        self.key.file_key()
    }

    /// Whether a worker may pick this task up at `now`
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.dead_lettered && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Whether the task is waiting out a backoff delay at `now`
    pub fn is_backed_off(&self, now: DateTime<Utc>) -> bool {
        !self.dead_lettered && self.next_attempt_at.map_or(false, |at| at > now)
    }

    /// Records a retryable failure
    ///
    /// Schedules the next attempt after the policy delay (raised to `floor`
    /// when the remote asked for a longer pause) or dead-letters the task
    /// once `max_attempts` is reached. Returns the scheduled delay, or `None`
    /// if the task was dead-lettered.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        policy: &RetryPolicy,
        floor: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
        self.updated_at = now;

        if self.attempts >= policy.max_attempts {
            self.dead_lettered = true;
            self.next_attempt_at = None;
            return None;
        }

        let mut delay = policy.delay_for(self.attempts);
        if let Some(floor) = floor {
            delay = delay.max(floor);
        }
        self.next_attempt_at = Some(now + chrono_duration(delay));
        Some(delay)
    }

    /// Moves the task to the dead-letter state without further retries
    pub fn mark_dead(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
        self.dead_lettered = true;
        self.next_attempt_at = None;
        self.updated_at = now;
    }

    /// Clears failure history so the task runs again immediately
    pub fn revive(&mut self, now: DateTime<Utc>) {
        self.attempts = 0;
        self.last_error = None;
        self.dead_lettered = false;
        self.next_attempt_at = None;
        self.updated_at = now;
    }
}

/// Converts a std duration into a chrono one, clamping absurd values to ten years
pub fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(3650))
}
