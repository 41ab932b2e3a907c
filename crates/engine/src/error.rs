//! Upload engine error taxonomy.

use spool_core::UploadId;
use spool_metadata::MetadataError;
use spool_presence::PresenceError;
use spool_storage::StorageError;
use thiserror::Error;

/// Format missing chunk indices for display, capping the listed sample so
/// huge uploads do not bloat logs or responses.
fn format_missing(missing: &[u64]) -> String {
    const MAX_DISPLAYED: usize = 10;
    if missing.len() <= MAX_DISPLAYED {
        format!("{missing:?}")
    } else {
        format!(
            "{:?} (and {} more)",
            &missing[..MAX_DISPLAYED],
            missing.len() - MAX_DISPLAYED
        )
    }
}

/// Errors surfaced by engine operations.
///
/// Every operation is safe to retry after `Internal`; `Incomplete` leaves the
/// upload resumable.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller error: malformed input, out-of-range index, count mismatch,
    /// or an operation the upload's state does not allow.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown upload ID.
    #[error("not found: {0}")]
    NotFound(String),

    /// Merge attempted before every chunk was staged.
    #[error("upload {upload_id} is missing {} chunks: {}", .missing.len(), format_missing(.missing))]
    Incomplete {
        upload_id: UploadId,
        /// Missing indices, ascending.
        missing: Vec<u64>,
    },

    /// Backing store failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::NotFound(_) => "not_found",
            EngineError::Incomplete { .. } => "incomplete",
            EngineError::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Incomplete { .. } | EngineError::Internal(_))
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        EngineError::Internal(format!("storage: {e}"))
    }
}

impl From<MetadataError> for EngineError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Internal(format!("metadata: {other}")),
        }
    }
}

impl From<PresenceError> for EngineError {
    fn from(e: PresenceError) -> Self {
        EngineError::Internal(format!("presence: {e}"))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
