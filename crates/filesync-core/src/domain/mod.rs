//! Domain entities and business logic
//!
//! This module contains the core domain types for filesync:
//! - Newtypes for space and file identifiers and content addresses
//! - Immutable content-addressed blocks
//! - Sync tasks with retry bookkeeping
//! - Read-only status views and engine events
//! - Domain-specific error types

pub mod block;
pub mod errors;
pub mod events;
pub mod newtypes;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use block::Block;
pub use errors::DomainError;
pub use events::SyncEvent;
pub use newtypes::*;
pub use status::{FileSyncState, SyncStatus, TaskSnapshot};
pub use task::{FileKey, RetryPolicy, Task, TaskKey, TaskKind};
