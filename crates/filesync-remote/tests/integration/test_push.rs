//! Block upload: `POST /spaces/{space}/files/{file}/blocks`

use base64::Engine;
use filesync_core::domain::Block;
use filesync_core::ports::{IRemoteStore, RemoteError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_push_sends_blocks_with_links_and_base64_data() {
    let (server, client) = common::setup_remote_mock().await;

    let leaf = Block::leaf(b"leaf data".to_vec());
    let root = Block::new(vec![*leaf.cid()], b"root".to_vec());

    Mock::given(method("POST"))
        .and(path("/spaces/space1/files/file1/blocks"))
        .and(header("Authorization", format!("Bearer {}", common::TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .push_blocks(&common::space(), &common::file(), vec![root.clone(), leaf.clone()])
        .await
        .expect("push failed");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let sent = body["blocks"].as_array().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["cid"], root.cid().to_string());
    assert_eq!(sent[0]["links"][0], leaf.cid().to_string());

    let data = base64::engine::general_purpose::STANDARD
        .decode(sent[1]["data"].as_str().unwrap())
        .unwrap();
    assert_eq!(data, b"leaf data");
}

#[tokio::test]
async fn test_push_empty_batch_skips_network() {
    let (server, client) = common::setup_remote_mock().await;

    client
        .push_blocks(&common::space(), &common::file(), Vec::new())
        .await
        .unwrap();
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_push_payload_too_large_is_rejected() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/spaces/space1/files/file1/blocks"))
        .respond_with(ResponseTemplate::new(413).set_body_string("payload too large"))
        .mount(&server)
        .await;

    let err = client
        .push_blocks(&common::space(), &common::file(), common::blocks())
        .await
        .unwrap_err();
    match err {
        RemoteError::Rejected(detail) => assert!(detail.contains("payload too large")),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_push_server_error_is_retryable() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/spaces/space1/files/file1/blocks"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client
        .push_blocks(&common::space(), &common::file(), common::blocks())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Unavailable(_)));
    assert!(err.is_retryable());
}
