//! Upload diffing, batching and draining

use std::collections::HashSet;

use filesync_core::domain::{Cid, FileSyncState, SyncEvent};
use filesync_core::ports::IBlockStore;

use crate::common::{next_event, space, test_config, Call, Harness};

#[tokio::test]
async fn test_upload_pushes_only_missing_blocks() {
    let h = Harness::new(test_config().build()).await;
    let (file, blocks) = h.store_file(&[b"one", b"two", b"three"]).await;
    // The remote already has the first leaf, e.g. from another file
    h.remote.seed(&space(), &[*blocks[1].cid()]);

    h.sync.add_file(&space(), &file).await.unwrap();
    h.start();
    h.wait_idle().await;

    let pushed: HashSet<Cid> = h.remote.pushed().into_iter().collect();
    let expected: HashSet<Cid> = [&blocks[0], &blocks[2], &blocks[3]]
        .iter()
        .map(|b| *b.cid())
        .collect();
    assert_eq!(pushed, expected);
    assert!(h.remote.has_file(&space(), &file));
    assert!(h.sync.file_status(&space(), &file).is_none());
    h.stop().await;
}

#[tokio::test]
async fn test_reupload_of_synced_file_pushes_nothing() {
    let h = Harness::new(test_config().build()).await;
    let (file, _) = h.store_file(&[b"alpha", b"beta"]).await;
    h.start();

    h.sync.add_file(&space(), &file).await.unwrap();
    h.wait_idle().await;
    let pushes = h.remote.push_calls();
    assert_eq!(pushes, 1);

    h.sync.add_file(&space(), &file).await.unwrap();
    h.wait_idle().await;
    assert_eq!(h.remote.push_calls(), pushes);
    h.stop().await;
}

#[tokio::test]
async fn test_repeated_add_while_pending_merges() {
    let h = Harness::new(test_config().build()).await;
    let (file, blocks) = h.store_file(&[b"x", b"y"]).await;

    for _ in 0..5 {
        h.sync.add_file(&space(), &file).await.unwrap();
    }
    assert_eq!(h.sync.sync_status().queue_len, 1);
    assert_eq!(
        h.sync.file_status(&space(), &file).unwrap().state,
        FileSyncState::Pending
    );

    h.start();
    h.wait_idle().await;

    let pushed = h.remote.pushed();
    assert_eq!(pushed.len(), blocks.len());
    let unique: HashSet<&Cid> = pushed.iter().collect();
    assert_eq!(unique.len(), pushed.len());
    h.stop().await;
}

#[tokio::test]
async fn test_push_batches_bounded_by_bytes() {
    // Every block exceeds the budget alone, so each goes in its own batch
    let config = test_config()
        .sync_push_batch_bytes(1)
        .sync_exists_batch_size(2)
        .build();
    let h = Harness::new(config).await;
    let (file, blocks) = h.store_file(&[b"a", b"b", b"c"]).await;

    h.sync.add_file(&space(), &file).await.unwrap();
    h.start();
    h.wait_idle().await;

    let calls = h.remote.calls();
    let exists: Vec<usize> = calls
        .iter()
        .filter_map(|c| match c {
            Call::Exists { cids, .. } => Some(cids.len()),
            _ => None,
        })
        .collect();
    assert_eq!(exists, vec![2, 2]);
    assert_eq!(h.remote.push_calls(), blocks.len());
    h.stop().await;
}

#[tokio::test]
async fn test_small_blocks_share_a_batch() {
    let h = Harness::new(test_config().build()).await;
    let (file, blocks) = h.store_file(&[b"a", b"b", b"c", b"d"]).await;

    h.sync.add_file(&space(), &file).await.unwrap();
    h.start();
    h.wait_idle().await;

    assert_eq!(h.remote.push_calls(), 1);
    assert_eq!(h.remote.pushed().len(), blocks.len());
    h.stop().await;
}

#[tokio::test]
async fn test_many_files_drain() {
    let h = Harness::new(test_config().sync_workers(4).build()).await;
    let mut files = Vec::new();
    for i in 0..20u32 {
        let payload = format!("file {i}");
        let (file, _) = h.store_file(&[payload.as_bytes()]).await;
        files.push(file);
    }

    h.start();
    for file in &files {
        h.sync.add_file(&space(), file).await.unwrap();
    }
    h.wait_idle().await;

    for file in &files {
        assert!(h.remote.has_file(&space(), file));
    }
    let status = h.sync.sync_status();
    assert_eq!(status.queue_len, 0);
    assert_eq!(status.in_flight, 0);
    assert!(status.dead_lettered.is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_missing_local_block_dead_letters() {
    let h = Harness::new(test_config().build()).await;
    let mut events = h.sync.subscribe();
    let (file, blocks) = h.store_file(&[b"kept", b"lost"]).await;
    h.blocks.delete(blocks[2].cid()).await.unwrap();

    h.sync.add_file(&space(), &file).await.unwrap();
    h.start();

    let event = next_event(&mut events, |e| matches!(e, SyncEvent::DeadLettered { .. })).await;
    assert_eq!(event.key().file, file);

    let status = h.sync.sync_status();
    assert!(status.is_idle());
    assert_eq!(status.dead_lettered.len(), 1);
    assert_eq!(status.dead_lettered[0].key.file, file);
    assert_eq!(h.remote.push_calls(), 0);
    assert!(h.remote.calls().is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_non_address_file_id_dead_letters() {
    let h = Harness::new(test_config().build()).await;
    let mut events = h.sync.subscribe();
    let file = filesync_core::domain::FileId::new("not-a-cid").unwrap();

    h.sync.add_file(&space(), &file).await.unwrap();
    h.start();

    let event = next_event(&mut events, |e| matches!(e, SyncEvent::DeadLettered { .. })).await;
    match event {
        SyncEvent::DeadLettered { error, .. } => assert!(error.contains("Invalid file reference")),
        other => panic!("unexpected event {other:?}"),
    }
    h.stop().await;
}
