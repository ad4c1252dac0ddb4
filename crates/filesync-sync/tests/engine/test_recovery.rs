//! Crash recovery and graceful shutdown

use filesync_core::domain::{FileSyncState, SyncEvent};
use filesync_core::ports::RemoteError;

use crate::common::{next_event, space, test_config, FakeRemote, Harness};

#[tokio::test]
async fn test_pending_tasks_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("filesync.db");
    let remote = FakeRemote::new();

    let (file, blocks) = {
        let h = Harness::on_disk(test_config().build(), &db, remote.clone()).await;
        let (file, blocks) = h.store_file(&[b"durable", b"payload"]).await;
        h.sync.add_file(&space(), &file).await.unwrap();
        h.sync
            .remove_file(&space(), &filesync_core::domain::FileId::new("gone").unwrap())
            .await
            .unwrap();
        // Dropped without ever starting workers, as if the process died
        h.pool.close().await;
        (file, blocks)
    };

    let h = Harness::on_disk(test_config().build(), &db, remote.clone()).await;
    assert_eq!(h.sync.sync_status().queue_len, 2);
    assert_eq!(
        h.sync.file_status(&space(), &file).unwrap().state,
        FileSyncState::Pending
    );

    h.start();
    h.wait_idle().await;

    assert_eq!(remote.pushed().len(), blocks.len());
    assert_eq!(remote.delete_calls().len(), 1);
    h.stop().await;
}

#[tokio::test]
async fn test_failure_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("filesync.db");
    let remote = FakeRemote::new();
    let config = test_config()
        .retry_base_delay_ms(60_000)
        .retry_max_delay_ms(60_000)
        .build();

    let file = {
        let h = Harness::on_disk(config.clone(), &db, remote.clone()).await;
        let mut events = h.sync.subscribe();
        let (file, _) = h.store_file(&[b"retry me"]).await;
        remote.fail_next(1, RemoteError::Unavailable("502 Bad Gateway".into()));
        h.sync.add_file(&space(), &file).await.unwrap();
        h.start();
        next_event(&mut events, |e| matches!(e, SyncEvent::Retrying { .. })).await;
        h.stop().await;
        h.pool.close().await;
        file
    };

    // Backoff is cleared on restart by default, the attempt count is kept
    let h = Harness::on_disk(config, &db, remote.clone()).await;
    let snapshot = h.sync.file_status(&space(), &file).unwrap();
    assert_eq!(snapshot.attempts, 1);
    assert_eq!(snapshot.state, FileSyncState::Pending);

    h.start();
    h.wait_idle().await;
    assert!(remote.has_file(&space(), &file));
    h.stop().await;
}

#[tokio::test]
async fn test_backoff_honored_across_restart_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("filesync.db");
    let remote = FakeRemote::new();
    let config = test_config()
        .retry_base_delay_ms(60_000)
        .retry_max_delay_ms(60_000)
        .retry_honor_backoff_on_restart(true)
        .build();

    let file = {
        let h = Harness::on_disk(config.clone(), &db, remote.clone()).await;
        let mut events = h.sync.subscribe();
        let (file, _) = h.store_file(&[b"patience"]).await;
        remote.fail_next(1, RemoteError::Timeout);
        h.sync.add_file(&space(), &file).await.unwrap();
        h.start();
        next_event(&mut events, |e| matches!(e, SyncEvent::Retrying { .. })).await;
        h.stop().await;
        h.pool.close().await;
        file
    };

    let h = Harness::on_disk(config, &db, remote).await;
    assert!(matches!(
        h.sync.file_status(&space(), &file).unwrap().state,
        FileSyncState::BackedOff { .. }
    ));
    assert_eq!(h.sync.sync_status().backed_off, 1);
}

#[tokio::test]
async fn test_shutdown_releases_in_flight_task() {
    let h = Harness::new(test_config().build()).await;
    let (file, blocks) = h.store_file(&[b"interrupted"]).await;

    h.remote.hold();
    h.sync.add_file(&space(), &file).await.unwrap();
    h.start();
    h.remote.wait_held().await;
    assert_eq!(h.sync.sync_status().in_flight, 1);

    h.stop().await;
    assert!(!h.sync.is_running());

    // Interrupted, not failed: no attempt recorded
    let snapshot = h.sync.file_status(&space(), &file).unwrap();
    assert_eq!(snapshot.state, FileSyncState::Pending);
    assert_eq!(snapshot.attempts, 0);
    assert!(h.remote.pushed().is_empty());

    h.remote.release();
    h.start();
    h.wait_idle().await;
    assert_eq!(h.remote.pushed().len(), blocks.len());
    h.stop().await;
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let h = Harness::new(test_config().build()).await;
    assert!(h.sync.start(&h.shutdown));
    assert!(!h.sync.start(&h.shutdown));
    assert!(h.sync.is_running());
    h.stop().await;
    assert!(!h.sync.is_running());
}

#[tokio::test]
async fn test_cancelling_parent_token_stops_workers() {
    let h = Harness::new(test_config().build()).await;
    let (file, _) = h.store_file(&[b"never sent"]).await;
    h.start();
    h.shutdown.cancel();

    h.sync.add_file(&space(), &file).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(h.sync.sync_status().queue_len, 1);
    assert!(h.remote.calls().is_empty());
}
