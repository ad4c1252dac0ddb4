//! Remote store port (driven/secondary port)
//!
//! This module defines the network boundary of the sync engine: the remote
//! file service that stores blocks per space. The engine only ever asks
//! which blocks the remote already has, pushes the missing ones, and
//! requests file deletion.
//!
//! ## Design Notes
//!
//! - Unlike the local ports, errors here are typed ([`RemoteError`]) because
//!   the scheduler must tell retryable failures from terminal ones.
//! - `push_blocks` and `delete_file` must be idempotent on the remote side:
//!   blocks are deduplicated by address and deleting an absent file succeeds.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{Block, Cid, FileId, SpaceId};

/// Errors reported by a remote store implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection-level failure (refused, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// The call did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// The remote asked us to slow down
    #[error("Throttled by remote, retry after {retry_after:?}")]
    Throttled {
        /// Minimum pause requested by the remote
        retry_after: Duration,
    },

    /// The remote is temporarily unable to serve (5xx)
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// Credentials rejected or access to the space denied
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The space or file reference is permanently invalid
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote refused the request as malformed or too large
    #[error("Rejected by remote: {0}")]
    Rejected(String),

    /// The remote answered with something we cannot interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::Throttled { .. } | Self::Unavailable(_)
        )
    }

    /// Minimum delay the remote asked for, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Port trait for the remote file service
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Returns the subset of `cids` the remote already stores for `space`
    ///
    /// An empty input yields an empty set without a network call.
    async fn exists_remotely(
        &self,
        space: &SpaceId,
        cids: &[Cid],
    ) -> Result<HashSet<Cid>, RemoteError>;

    /// Uploads block payloads and associates them with `file`
    ///
    /// Safe to call repeatedly with blocks that are already present.
    async fn push_blocks(
        &self,
        space: &SpaceId,
        file: &FileId,
        blocks: Vec<Block>,
    ) -> Result<(), RemoteError>;

    /// Removes `file` from the remote; succeeds if it is already absent
    async fn delete_file(&self, space: &SpaceId, file: &FileId) -> Result<(), RemoteError>;
}
