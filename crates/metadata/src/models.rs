//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use spool_core::{UploadId, UploadRecord, UploadStatus};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Row of the `uploads` table.
#[derive(Debug, Clone, FromRow)]
pub struct UploadRow {
    pub upload_id: Uuid,
    pub owner_id: String,
    pub file_name: String,
    pub total_chunks: i64,
    pub status: String,
    pub stored_path: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UploadRow {
    pub fn status(&self) -> MetadataResult<UploadStatus> {
        Ok(UploadStatus::parse(&self.status)?)
    }
}

impl TryFrom<&UploadRecord> for UploadRow {
    type Error = MetadataError;

    fn try_from(record: &UploadRecord) -> MetadataResult<Self> {
        let total_chunks = i64::try_from(record.total_chunks).map_err(|_| {
            MetadataError::Corrupt(format!("total_chunks out of range: {}", record.total_chunks))
        })?;
        Ok(Self {
            upload_id: *record.upload_id.as_uuid(),
            owner_id: record.owner_id.clone(),
            file_name: record.file_name.clone(),
            total_chunks,
            status: record.status.as_str().to_string(),
            stored_path: record.stored_path.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl TryFrom<UploadRow> for UploadRecord {
    type Error = MetadataError;

    fn try_from(row: UploadRow) -> MetadataResult<Self> {
        let status = row.status()?;
        let total_chunks = u64::try_from(row.total_chunks).map_err(|_| {
            MetadataError::Corrupt(format!(
                "upload {} has negative total_chunks {}",
                row.upload_id, row.total_chunks
            ))
        })?;
        if status.is_completed() && row.stored_path.is_none() {
            return Err(MetadataError::Corrupt(format!(
                "upload {} is completed without a stored path",
                row.upload_id
            )));
        }
        Ok(UploadRecord {
            upload_id: UploadId::from_uuid(row.upload_id),
            owner_id: row.owner_id,
            file_name: row.file_name,
            total_chunks,
            status,
            stored_path: row.stored_path,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_row_conversion_preserves_fields() {
        let record = UploadRecord::new("alice", "a.bin", 3);
        let row = UploadRow::try_from(&record).unwrap();
        assert_eq!(row.status, "in_progress");
        assert_eq!(row.total_chunks, 3);

        let back = UploadRecord::try_from(row).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn completed_row_without_path_is_corrupt() {
        let mut row = UploadRow::try_from(&UploadRecord::new("alice", "a.bin", 1)).unwrap();
        row.status = "completed".to_string();
        assert!(matches!(
            UploadRecord::try_from(row),
            Err(MetadataError::Corrupt(_))
        ));
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let mut row = UploadRow::try_from(&UploadRecord::new("alice", "a.bin", 1)).unwrap();
        row.status = "aborted".to_string();
        assert!(matches!(row.status(), Err(MetadataError::Corrupt(_))));
    }
}
