//! filesync Remote - HTTP client for the remote block service
//!
//! Implements the `IRemoteStore` port from `filesync-core` over a small
//! REST API scoped per space:
//!
//! | Operation         | Request                                        |
//! |-------------------|------------------------------------------------|
//! | `exists_remotely` | `POST {base}/spaces/{space}/blocks/check`      |
//! | `push_blocks`     | `POST {base}/spaces/{space}/files/{file}/blocks` |
//! | `delete_file`     | `DELETE {base}/spaces/{space}/files/{file}`    |
//!
//! The client performs a single attempt per call. Retries, backoff and
//! throttling pauses are owned by the sync scheduler, which gets a
//! classified [`RemoteError`](filesync_core::ports::RemoteError) back.
//!
//! ## Modules
//!
//! - [`client`] - `HttpRemoteStore` and HTTP status classification
//! - [`rate_limit`] - `Retry-After` header parsing

pub mod client;
pub mod rate_limit;

pub use client::HttpRemoteStore;
