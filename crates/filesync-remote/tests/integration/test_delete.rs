//! File deletion: `DELETE /spaces/{space}/files/{file}`

use filesync_core::ports::{IRemoteStore, RemoteError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_delete_file_succeeds() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/spaces/space1/files/file1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .delete_file(&common::space(), &common::file())
        .await
        .expect("delete failed");
}

#[tokio::test]
async fn test_delete_absent_file_is_success() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/spaces/space1/files/file1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    client
        .delete_file(&common::space(), &common::file())
        .await
        .unwrap();
    client
        .delete_file(&common::space(), &common::file())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_unauthorized_is_fatal() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/spaces/space1/files/file1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client
        .delete_file(&common::space(), &common::file())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_delete_request_timeout_is_retryable() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/spaces/space1/files/file1"))
        .respond_with(ResponseTemplate::new(408))
        .mount(&server)
        .await;

    let err = client
        .delete_file(&common::space(), &common::file())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Timeout));
    assert!(err.is_retryable());
}
