//! `FileSync` - the public entry point of the sync engine
//!
//! Wires the durable queue, the content adapter, the remote client and the
//! worker pool together. Requests are durable once `add_file` or
//! `remove_file` returns `Ok`; they survive a crash and are picked up again
//! by the next [`FileSync::open`] on the same store.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let sync = FileSync::open(&config, tasks, blocks, remote).await?;
//! let shutdown = CancellationToken::new();
//! sync.start(&shutdown);
//!
//! sync.add_file(&space, &file).await?;
//! while !sync.sync_status().is_idle() {
//!     tokio::time::sleep(Duration::from_millis(100)).await;
//! }
//! sync.shutdown().await;
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use filesync_core::config::Config;
use filesync_core::domain::{
    FileId, FileKey, SpaceId, SyncEvent, SyncStatus, TaskKey, TaskKind, TaskSnapshot,
};
use filesync_core::ports::{IBlockStore, IRemoteStore, ITaskRepository};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::content::ContentStore;
use crate::queue::{EnqueueOutcome, TaskQueue};
use crate::scheduler::{SchedulerHandle, SyncScheduler};
use crate::status::StatusReporter;
use crate::transfer::{Transfer, TransferLimits};
use crate::SyncError;

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 256;

/// Durable file sync engine
pub struct FileSync {
    queue: Arc<TaskQueue>,
    scheduler: Arc<SyncScheduler>,
    status: StatusReporter,
    events: broadcast::Sender<SyncEvent>,
    running: Mutex<Option<SchedulerHandle>>,
}

impl FileSync {
    /// Restores the queue from `tasks` and prepares the worker pool
    ///
    /// Workers are not started until [`start`](Self::start).
    pub async fn open(
        config: &Config,
        tasks: Arc<dyn ITaskRepository>,
        blocks: Arc<dyn IBlockStore>,
        remote: Arc<dyn IRemoteStore>,
    ) -> Result<Self, SyncError> {
        let queue = Arc::new(
            TaskQueue::open(
                tasks,
                config.retry_policy(),
                config.retry.honor_backoff_on_restart,
            )
            .await?,
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let transfer = Arc::new(Transfer::new(
            ContentStore::new(blocks),
            remote,
            TransferLimits::from(&config.sync),
        ));
        let scheduler = Arc::new(SyncScheduler::new(
            Arc::clone(&queue),
            transfer,
            events.clone(),
            config.sync.workers,
            config.sync.poll_interval(),
        ));

        Ok(Self {
            status: StatusReporter::new(Arc::clone(&queue)),
            queue,
            scheduler,
            events,
            running: Mutex::new(None),
        })
    }

    /// Starts the worker pool; returns `false` if it was already running
    ///
    /// Workers stop when `shutdown` is cancelled or on [`shutdown`](Self::shutdown).
    pub fn start(&self, shutdown: &CancellationToken) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            debug!("Sync engine already running");
            return false;
        }
        *running = Some(self.scheduler.start(shutdown.child_token()));
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stops the workers and waits for them; interrupted tasks stay queued
    pub async fn shutdown(&self) {
        let handle = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!(pending = self.queue.len(), "Sync engine stopped");
        }
    }

    /// Requests that `file` be uploaded to `space`
    ///
    /// A pending delete for the same file is cancelled and replaced.
    pub async fn add_file(&self, space: &SpaceId, file: &FileId) -> Result<(), SyncError> {
        self.request(TaskKey::new(space.clone(), file.clone(), TaskKind::Upload))
            .await
    }

    /// Requests that `file` be removed from `space`
    ///
    /// A pending upload for the same file is cancelled and replaced.
    pub async fn remove_file(&self, space: &SpaceId, file: &FileId) -> Result<(), SyncError> {
        self.request(TaskKey::new(space.clone(), file.clone(), TaskKind::Delete))
            .await
    }

    async fn request(&self, key: TaskKey) -> Result<(), SyncError> {
        let outcome = self.queue.enqueue(key.clone()).await?;
        debug!(task = %key, ?outcome, "Sync requested");

        if let EnqueueOutcome::Replaced { previous } = outcome {
            let replaced_by = key.kind;
            // No subscribers is fine
            let _ = self.events.send(SyncEvent::Cancelled {
                key: key.file_key().with_kind(previous),
                replaced_by,
            });
        }
        Ok(())
    }

    /// Aggregate queue status, computed from memory
    pub fn sync_status(&self) -> SyncStatus {
        self.status.sync_status()
    }

    /// State of the task for one file, or `None` if nothing is queued for it
    pub fn file_status(&self, space: &SpaceId, file: &FileId) -> Option<TaskSnapshot> {
        self.status
            .file_status(&FileKey::new(space.clone(), file.clone()))
    }

    /// A cloneable read-only status handle
    pub fn status_reporter(&self) -> StatusReporter {
        self.status.clone()
    }

    /// Stream of task lifecycle events from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Re-arms every dead-lettered task; returns how many were revived
    pub async fn retry_dead_letters(&self) -> Result<usize, SyncError> {
        self.queue.retry_dead_letters().await
    }

    /// Gives up on `file`'s dead-lettered task; returns `false` if it had none
    pub async fn discard_dead_letter(
        &self,
        space: &SpaceId,
        file: &FileId,
    ) -> Result<bool, SyncError> {
        self.queue
            .discard_dead_letter(&FileKey::new(space.clone(), file.clone()))
            .await
    }
}
