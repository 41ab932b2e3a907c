//! Upload identifiers, lifecycle status and the durable upload record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Server-generated identifier for one logical file upload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a fresh random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the canonical hyphenated form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidUploadId(format!("{s:?}: {e}")))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for UploadId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an upload.
///
/// The only legal transition is `InProgress -> Completed`; a completed
/// upload never goes back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Accepting chunks.
    InProgress,
    /// Merged into its final artifact.
    Completed,
}

impl UploadStatus {
    /// Storage representation used by the metadata store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        matches!((self, next), (Self::InProgress, Self::Completed))
    }

    /// Validate a transition, returning a descriptive error when illegal.
    pub fn transition_to(&self, next: UploadStatus) -> crate::Result<UploadStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::Error::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_id: UploadId,
    /// Opaque principal that created the upload.
    pub owner_id: String,
    /// Sanitized file name, for display and for deriving the final path.
    pub file_name: String,
    /// Declared number of chunks, fixed at creation.
    pub total_chunks: u64,
    pub status: UploadStatus,
    /// Final artifact location; set only once the upload is completed.
    pub stored_path: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UploadRecord {
    /// Create a new in-progress record with a fresh ID. The file name is
    /// sanitized on the way in.
    pub fn new(owner_id: impl Into<String>, file_name: &str, total_chunks: u64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            upload_id: UploadId::new(),
            owner_id: owner_id.into(),
            file_name: crate::paths::sanitize_file_name(file_name),
            total_chunks,
            status: UploadStatus::InProgress,
            stored_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Whether `index` falls inside the declared chunk range.
    pub fn contains_index(&self, index: u64) -> bool {
        index < self.total_chunks
    }
}
