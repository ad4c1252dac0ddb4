//! filesync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SpaceId`, `FileId`, `Cid`, `Block`, `Task`, `SyncStatus`
//! - **Port definitions** - Traits for adapters: `IBlockStore`, `IRemoteStore`, `ITaskRepository`
//! - **Configuration** - YAML-backed `Config` with validation
//!
//! # Architecture
//!
//! The domain module contains pure types with no I/O. Ports define the trait
//! interfaces that adapter crates (`filesync-cache`, `filesync-remote`)
//! implement and that the sync engine (`filesync-sync`) consumes.

pub mod config;
pub mod domain;
pub mod ports;
