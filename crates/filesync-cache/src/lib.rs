//! filesync Cache - Local persistence
//!
//! SQLite-based storage for:
//! - The durable sync task queue
//! - The local content-addressed block store
//!
//! ## Architecture
//!
//! This crate implements the `ITaskRepository` and `IBlockStore` ports from
//! `filesync-core` using SQLite as the storage backend. Both adapters can
//! share one [`DatabasePool`].
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteTaskRepository`] - `ITaskRepository` implementation
//! - [`SqliteBlockStore`] - `IBlockStore` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use filesync_cache::{DatabasePool, SqliteBlockStore, SqliteTaskRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/filesync/filesync.db")).await?;
//! let tasks = SqliteTaskRepository::new(pool.pool().clone());
//! let blocks = SqliteBlockStore::new(pool.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod block_store;
pub mod pool;
pub mod repository;

pub use block_store::SqliteBlockStore;
pub use pool::DatabasePool;
pub use repository::SqliteTaskRepository;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be turned back into a domain value
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A stored block no longer matches its content address
    #[error("Corrupted block {cid}")]
    CorruptBlock {
        cid: String,
        #[source]
        source: filesync_core::domain::DomainError,
    },
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
