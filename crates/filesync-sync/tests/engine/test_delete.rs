//! Delete tasks and upload/delete replacement

use filesync_core::domain::{FileId, SyncEvent, TaskKind};

use crate::common::{next_event, space, test_config, Call, Harness};

#[tokio::test]
async fn test_delete_makes_single_remote_call() {
    let h = Harness::new(test_config().build()).await;
    let file = FileId::new("file2").unwrap();

    h.sync.remove_file(&space(), &file).await.unwrap();
    h.start();
    h.wait_idle().await;

    assert_eq!(
        h.remote.calls(),
        vec![Call::Delete {
            space: space(),
            file: file.clone()
        }]
    );
    h.stop().await;
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let h = Harness::new(test_config().build()).await;
    let file = FileId::new("file2").unwrap();

    h.sync.remove_file(&space(), &file).await.unwrap();
    h.sync.remove_file(&space(), &file).await.unwrap();
    assert_eq!(h.sync.sync_status().queue_len, 1);

    h.start();
    h.wait_idle().await;
    assert_eq!(h.remote.delete_calls().len(), 1);

    // Deleting a file the remote no longer has still succeeds
    h.sync.remove_file(&space(), &file).await.unwrap();
    h.wait_idle().await;
    assert_eq!(h.remote.delete_calls().len(), 2);
    assert!(h.sync.sync_status().dead_lettered.is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_delete_cancels_pending_upload() {
    let h = Harness::new(test_config().build()).await;
    let mut events = h.sync.subscribe();
    let (file, _) = h.store_file(&[b"short lived"]).await;

    h.sync.add_file(&space(), &file).await.unwrap();
    h.sync.remove_file(&space(), &file).await.unwrap();

    let event = next_event(&mut events, |e| matches!(e, SyncEvent::Cancelled { .. })).await;
    match event {
        SyncEvent::Cancelled { key, replaced_by } => {
            assert_eq!(key.kind, TaskKind::Upload);
            assert_eq!(key.file, file);
            assert_eq!(replaced_by, TaskKind::Delete);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.sync.sync_status().queue_len, 1);
    assert_eq!(
        h.sync.file_status(&space(), &file).unwrap().key.kind,
        TaskKind::Delete
    );

    h.start();
    h.wait_idle().await;

    assert_eq!(h.remote.push_calls(), 0);
    assert_eq!(h.remote.delete_calls(), vec![(space(), file)]);
    h.stop().await;
}

#[tokio::test]
async fn test_upload_replaces_pending_delete() {
    let h = Harness::new(test_config().build()).await;
    let (file, blocks) = h.store_file(&[b"restored"]).await;

    h.sync.remove_file(&space(), &file).await.unwrap();
    h.sync.add_file(&space(), &file).await.unwrap();
    h.start();
    h.wait_idle().await;

    assert!(h.remote.delete_calls().is_empty());
    assert_eq!(h.remote.pushed().len(), blocks.len());
    assert!(h.remote.has_file(&space(), &file));
    h.stop().await;
}

#[tokio::test]
async fn test_delete_during_upload_wins() {
    let h = Harness::new(test_config().sync_workers(1).build()).await;
    let mut events = h.sync.subscribe();
    let (file, _) = h.store_file(&[b"racing"]).await;

    h.remote.hold();
    h.sync.add_file(&space(), &file).await.unwrap();
    h.start();
    h.remote.wait_held().await;

    // The upload is in flight; the delete replaces it in the queue
    h.sync.remove_file(&space(), &file).await.unwrap();
    h.remote.release();
    h.wait_idle().await;

    assert_eq!(h.remote.delete_calls(), vec![(space(), file.clone())]);
    assert!(!h.remote.has_file(&space(), &file));

    // The stale upload finishing must not report completion
    let completed = next_event(&mut events, |e| matches!(e, SyncEvent::Completed { .. })).await;
    assert_eq!(completed.key().kind, TaskKind::Delete);
    h.stop().await;
}
