//! Per-task transfer protocol
//!
//! ## Upload
//!
//! ```text
//! resolve addresses ─→ exists_remotely (chunked) ─→ delta = resolved − existing
//!                                                        │
//!                          push_blocks (byte-bounded batches) ←─ read delta blocks
//! ```
//!
//! ## Delete
//!
//! A single `delete_file` call; no diffing.
//!
//! Every remote call is bounded by the call timeout and aborts as soon as
//! the cancellation token fires.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use filesync_core::config::SyncConfig;
use filesync_core::domain::{Block, Cid, FileId, SpaceId, Task, TaskKind};
use filesync_core::ports::{IRemoteStore, RemoteError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::content::ContentStore;
use crate::SyncError;

/// Limits applied to a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub call_timeout: Duration,
    pub push_batch_bytes: usize,
    pub exists_batch_size: usize,
}

impl From<&SyncConfig> for TransferLimits {
    fn from(config: &SyncConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            push_batch_bytes: config.push_batch_bytes.max(1),
            exists_batch_size: config.exists_batch_size.max(1),
        }
    }
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

/// What a successful transfer did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Blocks reachable from the file's root
    pub resolved: usize,
    /// Blocks actually sent
    pub pushed_blocks: usize,
    /// Encoded size of the blocks sent
    pub pushed_bytes: usize,
    /// Number of `push_blocks` calls
    pub batches: usize,
}

/// Executes upload and delete tasks against the remote store
pub struct Transfer {
    content: ContentStore,
    remote: Arc<dyn IRemoteStore>,
    limits: TransferLimits,
}

impl Transfer {
    pub fn new(content: ContentStore, remote: Arc<dyn IRemoteStore>, limits: TransferLimits) -> Self {
        Self {
            content,
            remote,
            limits,
        }
    }

    /// Runs one attempt of `task`
    #[tracing::instrument(level = "debug", skip(self, task, cancel), fields(task = %task.key, attempt = task.attempts + 1))]
    pub async fn execute(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let (space, file) = (&task.key.space, &task.key.file);
        match task.kind() {
            TaskKind::Upload => self.upload(space, file, cancel).await,
            TaskKind::Delete => self.delete(space, file, cancel).await,
        }
    }

    /// Bounds a remote call by the call timeout and the cancellation token
    async fn call<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, SyncError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(self.limits.call_timeout, fut) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(SyncError::Remote(e)),
                Err(_) => Err(SyncError::Timeout),
            },
        }
    }

    async fn upload(
        &self,
        space: &SpaceId,
        file: &FileId,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, SyncError> {
        let addresses = self.content.resolve_addresses(file).await?;

        let mut existing: HashSet<Cid> = HashSet::with_capacity(addresses.len());
        for chunk in addresses.chunks(self.limits.exists_batch_size) {
            existing.extend(
                self.call(cancel, self.remote.exists_remotely(space, chunk))
                    .await?,
            );
        }

        let delta: Vec<Cid> = addresses
            .iter()
            .filter(|c| !existing.contains(*c))
            .copied()
            .collect();

        let mut report = TransferReport {
            resolved: addresses.len(),
            ..Default::default()
        };

        if delta.is_empty() {
            debug!(space = %space, file = %file, blocks = addresses.len(), "Remote already has every block");
            return Ok(report);
        }

        let mut batch: Vec<Block> = Vec::new();
        let mut batch_bytes = 0usize;
        for cids in delta.chunks(self.limits.exists_batch_size) {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            for block in self.content.read_blocks(cids).await? {
                let len = block.encoded_len();
                if !batch.is_empty() && batch_bytes + len > self.limits.push_batch_bytes {
                    self.push(space, file, std::mem::take(&mut batch), batch_bytes, &mut report, cancel)
                        .await?;
                    batch_bytes = 0;
                }
                batch_bytes += len;
                batch.push(block);
            }
        }
        if !batch.is_empty() {
            self.push(space, file, batch, batch_bytes, &mut report, cancel)
                .await?;
        }

        info!(
            space = %space,
            file = %file,
            resolved = report.resolved,
            pushed = report.pushed_blocks,
            bytes = report.pushed_bytes,
            batches = report.batches,
            "Upload finished"
        );
        Ok(report)
    }

    async fn push(
        &self,
        space: &SpaceId,
        file: &FileId,
        batch: Vec<Block>,
        bytes: usize,
        report: &mut TransferReport,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let count = batch.len();
        self.call(cancel, self.remote.push_blocks(space, file, batch))
            .await?;
        report.pushed_blocks += count;
        report.pushed_bytes += bytes;
        report.batches += 1;
        debug!(space = %space, file = %file, count, bytes, "Pushed batch");
        Ok(())
    }

    async fn delete(
        &self,
        space: &SpaceId,
        file: &FileId,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, SyncError> {
        self.call(cancel, self.remote.delete_file(space, file))
            .await?;
        info!(space = %space, file = %file, "Remote file deleted");
        Ok(TransferReport::default())
    }
}
