//! Content Store Adapter
//!
//! Read-only view of the local block store used by uploads: resolves a file
//! to every block address reachable from its root and fetches payloads.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use filesync_core::domain::{Block, Cid, DomainError, FileId};
use filesync_core::ports::IBlockStore;
use tracing::{debug, warn};

use crate::SyncError;

/// A `DomainError` anywhere in the chain means the stored data itself is bad
fn local_error(e: anyhow::Error) -> SyncError {
    if e.chain().any(|cause| cause.is::<DomainError>()) {
        SyncError::CorruptContent(format!("{e:#}"))
    } else {
        SyncError::LocalStore(format!("{e:#}"))
    }
}

/// Read-only facade over an [`IBlockStore`]
#[derive(Clone)]
pub struct ContentStore {
    blocks: Arc<dyn IBlockStore>,
}

impl ContentStore {
    pub fn new(blocks: Arc<dyn IBlockStore>) -> Self {
        Self { blocks }
    }

    /// Every block address reachable from `file`'s root, each exactly once
    ///
    /// Breadth-first from the root, so the root comes first. Fails with
    /// [`SyncError::BlockMissing`] listing every absent address, or
    /// [`SyncError::InvalidFileId`] if `file` is not a content address.
    pub async fn resolve_addresses(&self, file: &FileId) -> Result<Vec<Cid>, SyncError> {
        let root = file
            .root_cid()
            .map_err(|e| SyncError::InvalidFileId(e.to_string()))?;

        let mut order = Vec::new();
        let mut missing = Vec::new();
        let mut seen = HashSet::from([root]);
        let mut frontier = VecDeque::from([root]);

        while let Some(cid) = frontier.pop_front() {
            match self.blocks.get(&cid).await.map_err(local_error)? {
                Some(block) => {
                    for link in block.links() {
                        if seen.insert(*link) {
                            frontier.push_back(*link);
                        }
                    }
                    order.push(cid);
                }
                None => missing.push(cid),
            }
        }

        if !missing.is_empty() {
            warn!(file = %file, missing = missing.len(), "File content incomplete in local store");
            return Err(SyncError::BlockMissing(missing));
        }

        debug!(file = %file, blocks = order.len(), "Resolved file content");
        Ok(order)
    }

    /// Fetches the blocks for `cids`, in order
    ///
    /// Fails with [`SyncError::BlockMissing`] if any address is absent.
    pub async fn read_blocks(&self, cids: &[Cid]) -> Result<Vec<Block>, SyncError> {
        let present: HashSet<Cid> = self
            .blocks
            .exists_cids(cids)
            .await
            .map_err(local_error)?
            .into_iter()
            .collect();
        let missing: Vec<Cid> = cids
            .iter()
            .filter(|c| !present.contains(*c))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::BlockMissing(missing));
        }

        let mut blocks = Vec::with_capacity(cids.len());
        for cid in cids {
            match self.blocks.get(cid).await.map_err(local_error)? {
                Some(block) => blocks.push(block),
                // Collected between the existence check and the read
                None => return Err(SyncError::BlockMissing(vec![*cid])),
            }
        }
        Ok(blocks)
    }
}
