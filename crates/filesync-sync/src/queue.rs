//! Durable Task Queue
//!
//! Owns every pending [`Task`] from enqueue until completion. The persisted
//! records behind [`ITaskRepository`] are the source of truth; the in-memory
//! view is rebuilt from them on [`TaskQueue::open`].
//!
//! ## Ordering
//!
//! Every mutation writes to the repository first and updates memory only
//! after the write succeeded, so a crash or a failed write never leaves a
//! task in memory that is not on disk (or the reverse). Mutations are
//! serialized by an async write lock held across the repository call; the
//! in-memory state sits behind a plain mutex that is only held for short,
//! non-blocking sections. Status queries take that mutex alone and so never
//! wait on storage or network I/O.
//!
//! ## Slots
//!
//! The queue keeps one slot per [`FileKey`]. Which worker holds a slot is
//! tracked in memory only: after a restart every task is pending again.
//! When a slot is re-requested with the opposite kind while a worker holds
//! it, the task's revision is bumped; the worker's later `complete` or
//! `fail` then only releases the slot and the newer request runs next.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use filesync_core::domain::task::chrono_duration;
use filesync_core::domain::{
    FileKey, RetryPolicy, SyncStatus, Task, TaskKey, TaskKind, TaskSnapshot,
};
use filesync_core::ports::ITaskRepository;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::SyncError;

// ============================================================================
// Outcomes
// ============================================================================

/// What [`TaskQueue::enqueue`] did with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new task was created
    Created,
    /// An identical task was already pending; nothing changed
    Merged,
    /// A dead-lettered task of the same kind was re-armed
    Revived,
    /// A pending task of the opposite kind was cancelled and replaced
    Replaced { previous: TaskKind },
}

/// What happened to a task after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Scheduled for another attempt after `delay`
    Retrying { attempt: u32, delay: Duration },
    /// Moved to the dead-letter state
    DeadLettered,
    /// The slot had been re-requested meanwhile; the failure was dropped
    Superseded,
}

// ============================================================================
// TaskQueue
// ============================================================================

struct QueueState {
    tasks: HashMap<FileKey, Task>,
    in_flight: HashSet<FileKey>,
    next_seq: i64,
}

impl QueueState {
    /// The queued task `task` was taken from, if it is still the live one
    fn current(&self, task: &Task) -> Option<&Task> {
        self.tasks
            .get(&task.file_key())
            .filter(|cur| cur.key == task.key && cur.revision == task.revision)
    }
}

/// Persisted queue of upload and delete tasks
pub struct TaskQueue {
    repo: Arc<dyn ITaskRepository>,
    policy: RetryPolicy,
    state: Mutex<QueueState>,
    write_lock: tokio::sync::Mutex<()>,
    notify: Notify,
}

impl TaskQueue {
    /// Loads every persisted task and builds the in-memory view
    ///
    /// Backoff deadlines are cleared unless `honor_backoff_on_restart` is
    /// set; attempt counts and dead letters always survive.
    pub async fn open(
        repo: Arc<dyn ITaskRepository>,
        policy: RetryPolicy,
        honor_backoff_on_restart: bool,
    ) -> Result<Self, SyncError> {
        let persisted = repo.load_all().await.map_err(SyncError::persistence)?;

        let mut tasks: HashMap<FileKey, Task> = HashMap::with_capacity(persisted.len());
        let mut next_seq = 1;

        // load_all is ordered by seq, so a later row for the same file wins
        for mut task in persisted {
            next_seq = next_seq.max(task.seq + 1);
            if !honor_backoff_on_restart {
                task.next_attempt_at = None;
            }
            if let Some(older) = tasks.insert(task.file_key(), task) {
                warn!(task = %older.key, "Dropping superseded task row found on load");
                repo.delete(&older.key)
                    .await
                    .map_err(SyncError::persistence)?;
            }
        }

        let dead = tasks.values().filter(|t| t.dead_lettered).count();
        info!(
            pending = tasks.len() - dead,
            dead_lettered = dead,
            honor_backoff_on_restart,
            "Task queue restored"
        );

        Ok(Self {
            repo,
            policy,
            state: Mutex::new(QueueState {
                tasks,
                in_flight: HashSet::new(),
                next_seq,
            }),
            write_lock: tokio::sync::Mutex::new(()),
            notify: Notify::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The retry policy applied by [`fail`](Self::fail)
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Inserts or merges a task for `key`
    ///
    /// - same kind already pending: no-op
    /// - same kind dead-lettered: re-armed with a fresh attempt budget
    /// - opposite kind pending: replaced, the new task goes to the tail
    pub async fn enqueue(&self, key: TaskKey) -> Result<EnqueueOutcome, SyncError> {
        let _write = self.write_lock.lock().await;
        let now = Utc::now();
        let file_key = key.file_key();

        let (existing, seq) = {
            let state = self.state();
            (state.tasks.get(&file_key).cloned(), state.next_seq)
        };

        let (task, replaces, outcome) = match existing {
            Some(current) if current.kind() == key.kind && !current.dead_lettered => {
                debug!(task = %key, "Task already pending, merged");
                return Ok(EnqueueOutcome::Merged);
            }
            Some(mut current) if current.kind() == key.kind => {
                current.revive(now);
                (current, None, EnqueueOutcome::Revived)
            }
            Some(current) => {
                let previous = current.kind();
                let mut task = Task::new(key, seq, now);
                task.revision = current.revision + 1;
                (task, Some(previous), EnqueueOutcome::Replaced { previous })
            }
            None => (Task::new(key, seq, now), None, EnqueueOutcome::Created),
        };

        self.repo
            .put(&task, replaces)
            .await
            .map_err(SyncError::persistence)?;

        debug!(task = %task.key, seq = task.seq, outcome = ?outcome, "Task enqueued");
        {
            let mut state = self.state();
            if task.seq == seq {
                state.next_seq = seq + 1;
            }
            state.tasks.insert(file_key, task);
        }
        self.notify.notify_waiters();
        Ok(outcome)
    }

    /// Takes the next eligible task and marks its slot in flight
    ///
    /// Eligible means: not dead-lettered, backoff elapsed, and no worker
    /// holds the slot. Among those, the lowest insertion sequence wins.
    pub fn dequeue(&self) -> Option<Task> {
        let now = Utc::now();
        let mut state = self.state();
        let next = state
            .tasks
            .values()
            .filter(|t| t.is_eligible(now) && !state.in_flight.contains(&t.file_key()))
            .min_by_key(|t| t.seq)?
            .clone();
        state.in_flight.insert(next.file_key());
        Some(next)
    }

    /// Removes a finished task
    ///
    /// Returns `false` if the task was no longer current (already completed,
    /// or replaced while it ran); in that case only the slot is released.
    pub async fn complete(&self, task: &Task) -> Result<bool, SyncError> {
        let _write = self.write_lock.lock().await;
        let file_key = task.file_key();

        let is_current = self.state().current(task).is_some();
        if !is_current {
            debug!(task = %task.key, "Completed task no longer current, releasing slot");
            self.release_slot(&file_key);
            return Ok(false);
        }

        let result = self.repo.delete(&task.key).await;
        {
            let mut state = self.state();
            state.in_flight.remove(&file_key);
            if result.is_ok() {
                state.tasks.remove(&file_key);
            }
        }
        self.notify.notify_waiters();

        result.map_err(SyncError::persistence)?;
        Ok(true)
    }

    /// Records a retryable failure, dead-lettering once attempts run out
    ///
    /// A throttling error's `retry_after` raises the backoff delay.
    pub async fn fail(&self, task: &Task, error: &SyncError) -> Result<FailOutcome, SyncError> {
        let message = error.to_string();
        let floor = error.retry_after();
        let policy = self.policy;
        self.settle_failure(task, move |t, now| {
            t.record_failure(message, &policy, floor, now)
        })
        .await
    }

    /// Moves a task straight to the dead-letter state
    pub async fn dead_letter(
        &self,
        task: &Task,
        error: &SyncError,
    ) -> Result<FailOutcome, SyncError> {
        let message = error.to_string();
        self.settle_failure(task, move |t, now| {
            t.mark_dead(message, now);
            None
        })
        .await
    }

    async fn settle_failure(
        &self,
        task: &Task,
        apply: impl FnOnce(&mut Task, DateTime<Utc>) -> Option<Duration>,
    ) -> Result<FailOutcome, SyncError> {
        let _write = self.write_lock.lock().await;
        let file_key = task.file_key();
        let now = Utc::now();

        let current = { self.state().current(task).cloned() };
        let Some(mut updated) = current else {
            debug!(task = %task.key, "Failed task no longer current, releasing slot");
            self.release_slot(&file_key);
            return Ok(FailOutcome::Superseded);
        };

        let outcome = match apply(&mut updated, now) {
            Some(delay) => FailOutcome::Retrying {
                attempt: updated.attempts,
                delay,
            },
            None => FailOutcome::DeadLettered,
        };

        let result = self.repo.put(&updated, None).await;
        {
            let mut state = self.state();
            state.in_flight.remove(&file_key);
            match &result {
                Ok(()) => {
                    state.tasks.insert(file_key, updated);
                }
                Err(e) => {
                    // Hold the slot back in memory so a failing store is not hammered
                    error!(task = %task.key, error = %e, "Failed to persist task failure");
                    if let Some(live) = state.tasks.get_mut(&file_key) {
                        let delay = self.policy.delay_for(live.attempts.saturating_add(1));
                        live.next_attempt_at = Some(now + chrono_duration(delay));
                    }
                }
            }
        }
        self.notify.notify_waiters();

        result.map_err(SyncError::persistence)?;
        Ok(outcome)
    }

    /// Returns an in-flight task to pending without counting an attempt
    pub fn release(&self, task: &Task) {
        debug!(task = %task.key, "Releasing task");
        self.release_slot(&task.file_key());
    }

    fn release_slot(&self, file_key: &FileKey) {
        self.state().in_flight.remove(file_key);
        self.notify.notify_waiters();
    }

    /// Re-arms every dead-lettered task; returns how many were revived
    pub async fn retry_dead_letters(&self) -> Result<usize, SyncError> {
        let _write = self.write_lock.lock().await;
        let now = Utc::now();

        let dead: Vec<Task> = self
            .state()
            .tasks
            .values()
            .filter(|t| t.dead_lettered)
            .cloned()
            .collect();

        let mut revived = 0;
        for mut task in dead {
            task.revive(now);
            if let Err(e) = self.repo.put(&task, None).await {
                self.notify.notify_waiters();
                return Err(SyncError::persistence(e));
            }
            self.state().tasks.insert(task.file_key(), task);
            revived += 1;
        }

        if revived > 0 {
            info!(count = revived, "Dead-lettered tasks re-armed");
            self.notify.notify_waiters();
        }
        Ok(revived)
    }

    /// Drops the dead-lettered task for `file_key`
    ///
    /// Returns `false` if the slot is empty or holds a live task; live tasks
    /// are never touched.
    pub async fn discard_dead_letter(&self, file_key: &FileKey) -> Result<bool, SyncError> {
        let _write = self.write_lock.lock().await;

        let key = match self.state().tasks.get(file_key) {
            Some(task) if task.dead_lettered => task.key.clone(),
            _ => return Ok(false),
        };

        self.repo.delete(&key).await.map_err(SyncError::persistence)?;
        self.state().tasks.remove(file_key);
        info!(task = %key, "Dead-lettered task discarded");
        Ok(true)
    }

    // ========================================================================
    // Read-only views
    // ========================================================================

    /// Pending tasks, including in-flight and backed-off ones
    pub fn len(&self) -> usize {
        self.state()
            .tasks
            .values()
            .filter(|t| !t.dead_lettered)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time aggregate of the queue
    pub fn snapshot(&self) -> SyncStatus {
        let now = Utc::now();
        let state = self.state();
        let mut status = SyncStatus::default();

        for task in state.tasks.values() {
            if task.dead_lettered {
                status.dead_lettered.push(TaskSnapshot::of(task, false, now));
                continue;
            }
            status.queue_len += 1;
            if state.in_flight.contains(&task.file_key()) {
                status.in_flight += 1;
            } else if task.is_backed_off(now) {
                status.backed_off += 1;
            }
        }
        drop(state);

        status.dead_lettered.sort_by(|a, b| a.key.cmp(&b.key));
        status
    }

    /// Snapshot of the task occupying `file_key`'s slot, if any
    pub fn file_state(&self, file_key: &FileKey) -> Option<TaskSnapshot> {
        let now = Utc::now();
        let state = self.state();
        state
            .tasks
            .get(file_key)
            .map(|t| TaskSnapshot::of(t, state.in_flight.contains(file_key), now))
    }

    /// Earliest instant a backed-off task becomes eligible again
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let state = self.state();
        state
            .tasks
            .values()
            .filter(|t| !t.dead_lettered && !state.in_flight.contains(&t.file_key()))
            .filter_map(|t| t.next_attempt_at)
            .min()
    }

    /// Future resolved by the next queue change that may make work eligible
    ///
    /// Create (and enable) it before calling [`dequeue`](Self::dequeue) so a
    /// change racing the check is not missed.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}
