//! Existence check: `POST /spaces/{space}/blocks/check`

use std::time::Duration;

use filesync_core::domain::Cid;
use filesync_core::ports::{IRemoteStore, RemoteError};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_check_returns_existing_subset() {
    let (server, client) = common::setup_remote_mock().await;
    let blocks = common::blocks();
    let cids: Vec<Cid> = blocks.iter().map(|b| *b.cid()).collect();

    Mock::given(method("POST"))
        .and(path("/spaces/space1/blocks/check"))
        .and(header("Authorization", format!("Bearer {}", common::TOKEN).as_str()))
        .and(body_json(serde_json::json!({
            "cids": cids.iter().map(Cid::to_string).collect::<Vec<_>>()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "existing": [cids[0].to_string()]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let existing = client
        .exists_remotely(&common::space(), &cids)
        .await
        .expect("check failed");
    assert_eq!(existing.len(), 1);
    assert!(existing.contains(&cids[0]));
}

#[tokio::test]
async fn test_check_with_no_cids_skips_network() {
    let (server, client) = common::setup_remote_mock().await;

    let existing = client.exists_remotely(&common::space(), &[]).await.unwrap();
    assert!(existing.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_check_rejects_unrequested_cids() {
    let (server, client) = common::setup_remote_mock().await;
    let asked = Cid::digest(b"asked");
    let stray = Cid::digest(b"stray");

    Mock::given(method("POST"))
        .and(path("/spaces/space1/blocks/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "existing": [stray.to_string()]
        })))
        .mount(&server)
        .await;

    let err = client
        .exists_remotely(&common::space(), &[asked])
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_check_malformed_body_is_invalid_response() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/spaces/space1/blocks/check"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client
        .exists_remotely(&common::space(), &[Cid::digest(b"x")])
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_check_throttled_carries_retry_after() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/spaces/space1/blocks/check"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "17"))
        .mount(&server)
        .await;

    let err = client
        .exists_remotely(&common::space(), &[Cid::digest(b"x")])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Throttled {
            retry_after: Duration::from_secs(17)
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_check_status_classification() {
    let cases: [(u16, fn(&RemoteError) -> bool); 7] = [
        (401, |e| matches!(e, RemoteError::Unauthorized(_))),
        (408, |e| matches!(e, RemoteError::Timeout)),
        (403, |e| matches!(e, RemoteError::Unauthorized(_))),
        (404, |e| matches!(e, RemoteError::NotFound(_))),
        (413, |e| matches!(e, RemoteError::Rejected(_))),
        (500, |e| matches!(e, RemoteError::Unavailable(_))),
        (503, |e| matches!(e, RemoteError::Unavailable(_))),
    ];

    for (status, expected) in cases {
        let (server, client) = common::setup_remote_mock().await;
        Mock::given(method("POST"))
            .and(path("/spaces/space1/blocks/check"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = client
            .exists_remotely(&common::space(), &[Cid::digest(b"x")])
            .await
            .unwrap_err();
        assert!(expected(&err), "status {status} mapped to {err:?}");
    }
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let client = filesync_remote::HttpRemoteStore::with_base_url("http://127.0.0.1:9").unwrap();
    let err = client
        .exists_remotely(&common::space(), &[Cid::digest(b"x")])
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)));
    assert!(err.is_retryable());
}

/// Serves one request with a JSON body that stops halfway
async fn serve_truncated_body() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        // Drain the whole request so closing the socket does not reset it
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }

        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"existing\":[",
            )
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn test_check_truncated_body_is_retryable() {
    let base = serve_truncated_body().await;
    let client = filesync_remote::HttpRemoteStore::with_base_url(&base).unwrap();

    let err = client
        .exists_remotely(&common::space(), &[Cid::digest(b"x")])
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)), "got {err:?}");
    assert!(err.is_retryable());
}
