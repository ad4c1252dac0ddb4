//! Local block store port (driven/secondary port)
//!
//! The local content-addressed block store owned by the content-addressing
//! layer. The sync engine only reads from it; `add` and `delete` exist for
//! the layers that produce and garbage-collect content.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification.
//! - Absence is not an error: `get` returns `Ok(None)`.

use crate::domain::{Block, Cid};

/// Port trait for the local content-addressed block store
#[async_trait::async_trait]
pub trait IBlockStore: Send + Sync {
    /// Fetches a block by address, `None` if absent
    async fn get(&self, cid: &Cid) -> anyhow::Result<Option<Block>>;

    /// Stores blocks; already-present blocks are left untouched
    async fn add(&self, blocks: &[Block]) -> anyhow::Result<()>;

    /// Removes a block; removing an absent block succeeds
    async fn delete(&self, cid: &Cid) -> anyhow::Result<()>;

    /// Returns the subset of `cids` present locally, in input order
    async fn exists_cids(&self, cids: &[Cid]) -> anyhow::Result<Vec<Cid>>;
}
