//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! sync engine. Ports are interfaces that the engine depends on, but whose
//! implementations live in adapter crates (or in test doubles).
//!
//! ## Ports Overview
//!
//! - [`IBlockStore`] - Local content-addressed block store
//! - [`IRemoteStore`] - Remote file service, scoped per space
//! - [`ITaskRepository`] - Durable storage for the task queue

pub mod block_store;
pub mod remote_store;
pub mod task_repository;

pub use block_store::IBlockStore;
pub use remote_store::{IRemoteStore, RemoteError};
pub use task_repository::ITaskRepository;
