//! Upload record repository.

use crate::error::MetadataResult;
use crate::models::UploadRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for upload records.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` on a duplicate ID.
    async fn create_upload(&self, upload: &UploadRow) -> MetadataResult<()>;

    /// Get an upload record by ID.
    async fn get_upload(&self, upload_id: Uuid) -> MetadataResult<Option<UploadRow>>;

    /// Transition a record to `completed` and set its stored path.
    ///
    /// Only `in_progress` records are updated. Completing an already
    /// completed record with the same path is a no-op that returns it;
    /// any other path is an `InvalidStateTransition`. Unknown IDs are
    /// `NotFound`.
    async fn complete_upload(
        &self,
        upload_id: Uuid,
        stored_path: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<UploadRow>;

    /// Delete a record. Returns whether a row was removed.
    async fn delete_upload(&self, upload_id: Uuid) -> MetadataResult<bool>;

    /// Count records in the given status.
    async fn count_uploads_by_status(&self, status: &str) -> MetadataResult<u64>;
}

/// Decide the outcome of a completion whose conditional update touched
/// no row, given the record as it is now.
pub(crate) fn resolve_unapplied_completion(
    upload_id: Uuid,
    stored_path: &str,
    current: Option<UploadRow>,
) -> MetadataResult<UploadRow> {
    use crate::error::MetadataError;

    let Some(row) = current else {
        return Err(MetadataError::NotFound(format!("upload {upload_id}")));
    };
    match row.stored_path.as_deref() {
        Some(existing) if row.status == "completed" && existing == stored_path => Ok(row),
        _ => Err(MetadataError::InvalidStateTransition {
            from: row.status,
            to: "completed".to_string(),
        }),
    }
}
