//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly validation failures of identifiers and content addresses.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid space (namespace) identifier
    #[error("Invalid space ID: {0}")]
    InvalidSpaceId(String),

    /// Invalid file identifier
    #[error("Invalid file ID: {0}")]
    InvalidFileId(String),

    /// Malformed content address
    #[error("Invalid content address: {0}")]
    InvalidCid(String),

    /// A block's payload does not hash to its address
    #[error("Block integrity check failed for {0}")]
    IntegrityMismatch(String),

    /// Unknown task kind in persisted or wire data
    #[error("Invalid task kind: {0}")]
    InvalidTaskKind(String),
}
