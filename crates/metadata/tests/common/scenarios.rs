//! Store-agnostic scenarios run against every metadata backend.

use spool_core::{UploadRecord, UploadStatus};
use spool_metadata::{MetadataError, MetadataStore, UploadRow};
use std::sync::Arc;
use time::OffsetDateTime;

fn new_row(owner: &str, name: &str, total: u64) -> UploadRow {
    UploadRow::try_from(&UploadRecord::new(owner, name, total)).unwrap()
}

pub async fn create_and_get(store: Arc<dyn MetadataStore>) {
    let row = new_row("alice", "report.pdf", 3);
    store.create_upload(&row).await.unwrap();

    let fetched = store.get_upload(row.upload_id).await.unwrap().unwrap();
    let record = UploadRecord::try_from(fetched).unwrap();
    assert_eq!(record.owner_id, "alice");
    assert_eq!(record.file_name, "report.pdf");
    assert_eq!(record.total_chunks, 3);
    assert_eq!(record.status, UploadStatus::InProgress);
    assert!(record.stored_path.is_none());
}

pub async fn duplicate_id_rejected(store: Arc<dyn MetadataStore>) {
    let row = new_row("alice", "a.bin", 1);
    store.create_upload(&row).await.unwrap();

    match store.create_upload(&row).await {
        Err(MetadataError::AlreadyExists(_)) => {}
        other => panic!("expected AlreadyExists, got {other:?}"),
    }
}

pub async fn get_unknown_is_none(store: Arc<dyn MetadataStore>) {
    let missing = uuid::Uuid::new_v4();
    assert!(store.get_upload(missing).await.unwrap().is_none());
}

pub async fn complete_is_monotonic(store: Arc<dyn MetadataStore>) {
    let row = new_row("bob", "video.mp4", 2);
    store.create_upload(&row).await.unwrap();

    let path = format!("files/{}_video.mp4", row.upload_id);
    let done = store
        .complete_upload(row.upload_id, &path, OffsetDateTime::now_utc())
        .await
        .unwrap();
    assert_eq!(done.status, "completed");
    assert_eq!(done.stored_path.as_deref(), Some(path.as_str()));

    // Repeating the same completion is a no-op.
    let again = store
        .complete_upload(row.upload_id, &path, OffsetDateTime::now_utc())
        .await
        .unwrap();
    assert_eq!(again.stored_path, done.stored_path);

    // A different path would rewrite a completed record.
    match store
        .complete_upload(row.upload_id, "files/other", OffsetDateTime::now_utc())
        .await
    {
        Err(MetadataError::InvalidStateTransition { from, .. }) => assert_eq!(from, "completed"),
        other => panic!("expected InvalidStateTransition, got {other:?}"),
    }
}

pub async fn complete_unknown_is_not_found(store: Arc<dyn MetadataStore>) {
    match store
        .complete_upload(uuid::Uuid::new_v4(), "files/x", OffsetDateTime::now_utc())
        .await
    {
        Err(MetadataError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

pub async fn delete_removes_record(store: Arc<dyn MetadataStore>) {
    let row = new_row("carol", "a.bin", 1);
    store.create_upload(&row).await.unwrap();

    assert!(store.delete_upload(row.upload_id).await.unwrap());
    assert!(!store.delete_upload(row.upload_id).await.unwrap());
    assert!(store.get_upload(row.upload_id).await.unwrap().is_none());
}

pub async fn counts_by_status(store: Arc<dyn MetadataStore>) {
    let a = new_row("dave", "a", 1);
    let b = new_row("dave", "b", 1);
    store.create_upload(&a).await.unwrap();
    store.create_upload(&b).await.unwrap();
    store
        .complete_upload(a.upload_id, "files/a", OffsetDateTime::now_utc())
        .await
        .unwrap();

    assert_eq!(store.count_uploads_by_status("completed").await.unwrap(), 1);
    assert_eq!(store.count_uploads_by_status("in_progress").await.unwrap(), 1);
}

pub async fn concurrent_completions_agree(store: Arc<dyn MetadataStore>) {
    let row = new_row("erin", "big.iso", 4);
    store.create_upload(&row).await.unwrap();
    let path = format!("files/{}_big.iso", row.upload_id);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let path = path.clone();
        let id = row.upload_id;
        handles.push(tokio::spawn(async move {
            store
                .complete_upload(id, &path, OffsetDateTime::now_utc())
                .await
        }));
    }
    for handle in handles {
        let row = handle.await.unwrap().unwrap();
        assert_eq!(row.stored_path.as_deref(), Some(path.as_str()));
    }
}
