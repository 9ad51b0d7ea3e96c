//! Cross-module sync scenarios exercised through the public API, using
//! `MemoryAdapter` + `MockRemote` so no real I/O is involved. Unit-level
//! behavior for record projection, transaction rollback, and conflict
//! classification lives in `#[cfg(test)]` modules next to the code they
//! cover; these scenarios check the pieces working together.

use serde_json::json;
use sync_core::adapter::MemoryAdapter;
use sync_core::collection::CreateOptions;
use sync_core::id_schema::UuidIdSchema;
use sync_core::remote::MockRemote;
use sync_core::{CoreError, LocalCollection, Record, RecordStatus, SyncEngine, SyncOptions, SyncStrategy};

fn collection() -> LocalCollection<MemoryAdapter> {
    LocalCollection::new(
        MemoryAdapter::default(),
        Box::new(UuidIdSchema),
        Vec::new(),
        "default",
        "articles",
    )
}

fn rec(v: serde_json::Value) -> Record {
    Record::from_map(v.as_object().unwrap().clone())
}

#[tokio::test]
async fn no_conflict_sync_merges_local_creation_with_remote_changes() {
    let col = std::sync::Arc::new(collection());
    let remote = MockRemote::new();

    // A: already synced locally and on the server, unchanged.
    let a_id = "11111111-1111-4111-8111-111111111111";
    let mut a = rec(json!({"id": a_id, "title": "a"}));
    remote.seed(a.clone(), 10);
    a.set_status(RecordStatus::Synced);
    a.set_last_modified(Some(10));
    col.adapter().import_bulk(vec![a]).await.unwrap();
    col.adapter().save_last_modified(Some(10)).await.unwrap();

    // B: created locally, not yet pushed.
    let b = col
        .create(rec(json!({"title": "b"})), CreateOptions::default())
        .await
        .unwrap();
    let b_id = b.id().unwrap().to_string();

    // C: new on the server only.
    let c_id = "22222222-2222-4222-8222-222222222222";
    remote.seed(rec(json!({"id": c_id, "title": "c"})), 11);

    let eng = SyncEngine::new(
        col.clone(),
        remote.clone_handle(),
        Default::default(),
        Default::default(),
    );
    let result = eng.sync(&SyncOptions::default()).await.unwrap();

    assert!(result.ok());
    assert_eq!(result.created.iter().filter(|r| r.id() == Some(c_id)).count(), 1);
    assert_eq!(result.published.iter().filter(|r| r.id() == Some(b_id.as_str())).count(), 1);
    assert!(result.updated.iter().any(|r| r.id() == Some(a_id)));
    assert!(result.conflicts.is_empty());

    let synced_b = col.get(&b_id, Default::default()).await.unwrap();
    assert_eq!(synced_b.status(), Some(RecordStatus::Synced));
    let synced_c = col.get(c_id, Default::default()).await.unwrap();
    assert_eq!(synced_c.status(), Some(RecordStatus::Synced));
}

#[tokio::test]
async fn outgoing_conflict_under_client_wins_recreates_remote_record() {
    let col = std::sync::Arc::new(collection());
    let remote = MockRemote::new();
    let eng = SyncEngine::new(
        col.clone(),
        remote.clone_handle(),
        Default::default(),
        Default::default(),
    );

    let created = col
        .create(rec(json!({"title": "v1"})), CreateOptions::default())
        .await
        .unwrap();
    let id = created.id().unwrap().to_string();
    eng.sync(&SyncOptions::default()).await.unwrap();

    // Locally we edit the record; the server concurrently deletes it, which
    // shows up as a tombstone in the next changes feed.
    col.update(rec(json!({"id": id, "title": "new"})), Default::default())
        .await
        .unwrap();
    remote.seed(
        rec(json!({"id": id, "deleted": true})),
        remote.current_timestamp() + 1,
    );

    let opts = SyncOptions {
        strategy: SyncStrategy::ClientWins,
        ..Default::default()
    };
    let result = eng.sync(&opts).await.unwrap();
    assert!(result.ok());
    assert!(result.conflicts.is_empty());

    let local = col.get(&id, Default::default()).await.unwrap();
    assert_eq!(local.status(), Some(RecordStatus::Synced));
    assert_eq!(local.get("title"), Some(&json!("new")));
    assert_eq!(remote.record_count(), 1);
}

#[tokio::test]
async fn flush_is_detected_then_reset_sync_status_republishes_everything() {
    let col = std::sync::Arc::new(collection());
    let remote = MockRemote::new();
    let eng = SyncEngine::new(
        col.clone(),
        remote.clone_handle(),
        Default::default(),
        Default::default(),
    );

    col.create(rec(json!({"title": "a"})), CreateOptions::default())
        .await
        .unwrap();
    eng.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(remote.record_count(), 1);

    remote.flush(1);
    let err = eng.sync(&SyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, CoreError::ServerFlushed(_)));

    col.reset_sync_status().await.unwrap();
    let result = eng.sync(&SyncOptions::default()).await.unwrap();
    assert!(result.ok());
    assert_eq!(result.published.len(), 1);
    assert_eq!(remote.record_count(), 1);
}
