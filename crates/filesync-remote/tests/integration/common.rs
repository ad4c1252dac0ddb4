//! Shared test helpers for remote store integration tests

use filesync_core::domain::{Block, FileId, SpaceId};
use filesync_remote::HttpRemoteStore;
use wiremock::MockServer;

pub const TOKEN: &str = "test-token";

/// Starts a mock server and returns an authenticated client pointing at it
pub async fn setup_remote_mock() -> (MockServer, HttpRemoteStore) {
    let server = MockServer::start().await;
    let client = HttpRemoteStore::with_base_url(&server.uri())
        .expect("mock server URI is valid")
        .with_api_token(TOKEN);
    (server, client)
}

pub fn space() -> SpaceId {
    SpaceId::new("space1").unwrap()
}

pub fn file() -> FileId {
    FileId::new("file1").unwrap()
}

/// Three leaf blocks with distinct contents
pub fn blocks() -> Vec<Block> {
    vec![
        Block::leaf(b"one".to_vec()),
        Block::leaf(b"two".to_vec()),
        Block::leaf(b"three".to_vec()),
    ]
}
