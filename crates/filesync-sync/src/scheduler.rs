//! Sync scheduler - a bounded pool of workers draining the task queue
//!
//! ## Worker loop
//!
//! ```text
//!        ┌──────────── dequeue ────────────┐
//!        │ task                            │ none
//!        ▼                                 ▼
//!   Transfer::execute              wait for: enqueue/release notify
//!        │                                   | next backoff deadline
//!        ▼                                   | poll interval
//!   complete / fail / dead_letter / release  | shutdown
//! ```
//!
//! Each attempt runs in its own spawned task, so a panic inside the
//! transfer surfaces as a `JoinError` and is recorded as a retryable failure
//! of that task only. Shutdown cancels every in-flight attempt; interrupted
//! tasks are released back to pending, never completed or failed.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use filesync_core::domain::{SyncEvent, Task};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{FailOutcome, TaskQueue};
use crate::transfer::{Transfer, TransferReport};
use crate::SyncError;

/// Drives [`Transfer`] attempts for tasks taken from a [`TaskQueue`]
pub struct SyncScheduler {
    queue: Arc<TaskQueue>,
    transfer: Arc<Transfer>,
    events: broadcast::Sender<SyncEvent>,
    workers: usize,
    poll_interval: Duration,
}

/// Running worker pool; dropping it does not stop the workers
pub struct SchedulerHandle {
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Cancels in-flight attempts and waits for every worker to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Sync worker terminated abnormally");
            }
        }
    }

    /// Token that stops this pool when cancelled
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl SyncScheduler {
    /// Creates a scheduler; `workers` is clamped to at least one
    pub fn new(
        queue: Arc<TaskQueue>,
        transfer: Arc<Transfer>,
        events: broadcast::Sender<SyncEvent>,
        workers: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            transfer,
            events,
            workers: workers.max(1),
            poll_interval,
        }
    }

    /// Spawns the worker pool; it stops when `cancel` is cancelled
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> SchedulerHandle {
        info!(
            workers = self.workers,
            poll_ms = self.poll_interval.as_millis() as u64,
            pending = self.queue.len(),
            "Starting sync scheduler"
        );

        let workers = (0..self.workers)
            .map(|id| {
                let this = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { this.worker_loop(id, cancel).await })
            })
            .collect();

        SchedulerHandle { cancel, workers }
    }

    async fn worker_loop(&self, worker: usize, cancel: CancellationToken) {
        debug!(worker, "Sync worker started");

        loop {
            // Register for wake-ups before looking, so an enqueue that lands
            // between the check and the wait is not missed
            let notified = self.queue.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                break;
            }

            if let Some(task) = self.queue.dequeue() {
                self.run_task(worker, task, &cancel).await;
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.idle_wait()) => {}
            }
        }

        debug!(worker, "Sync worker stopped");
    }

    /// How long an idle worker sleeps: until the next backoff expiry, at most
    /// one poll interval
    fn idle_wait(&self) -> Duration {
        match self.queue.next_deadline() {
            Some(at) => (at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.poll_interval),
            None => self.poll_interval,
        }
    }

    async fn run_task(&self, worker: usize, task: Task, cancel: &CancellationToken) {
        debug!(worker, task = %task.key, attempt = task.attempts + 1, "Running task");

        let transfer = Arc::clone(&self.transfer);
        let attempt = task.clone();
        let token = cancel.child_token();
        let result = match tokio::spawn(async move { transfer.execute(&attempt, &token).await }).await
        {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(SyncError::WorkerPanic(panic_message(e.into_panic()))),
            Err(_) => Err(SyncError::Cancelled),
        };

        self.settle(worker, &task, result).await;
    }

    async fn settle(&self, worker: usize, task: &Task, result: Result<TransferReport, SyncError>) {
        let err = match result {
            Ok(_) => {
                match self.queue.complete(task).await {
                    Ok(true) => {
                        info!(worker, task = %task.key, "Task completed");
                        self.emit(SyncEvent::Completed {
                            key: task.key.clone(),
                        });
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(worker, task = %task.key, error = %e, "Failed to record completion")
                    }
                }
                return;
            }
            Err(SyncError::Cancelled) => {
                info!(worker, task = %task.key, "Task interrupted, returned to queue");
                self.queue.release(task);
                return;
            }
            Err(err) => err,
        };

        let outcome = if err.is_retryable() {
            self.queue.fail(task, &err).await
        } else {
            self.queue.dead_letter(task, &err).await
        };

        match outcome {
            Ok(FailOutcome::Retrying { attempt, delay }) => {
                warn!(
                    worker,
                    task = %task.key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Task failed, will retry"
                );
                self.emit(SyncEvent::Retrying {
                    key: task.key.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: err.to_string(),
                });
            }
            Ok(FailOutcome::DeadLettered) => {
                error!(worker, task = %task.key, error = %err, "Task dead-lettered");
                self.emit(SyncEvent::DeadLettered {
                    key: task.key.clone(),
                    error: err.to_string(),
                });
            }
            Ok(FailOutcome::Superseded) => {
                debug!(worker, task = %task.key, error = %err, "Failure of superseded task ignored");
            }
            Err(e) => {
                error!(worker, task = %task.key, error = %e, "Failed to record task failure");
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
