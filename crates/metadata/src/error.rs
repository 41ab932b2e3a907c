//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::Config(e.to_string())
    }
}

impl From<spool_core::Error> for MetadataError {
    fn from(e: spool_core::Error) -> Self {
        MetadataError::Corrupt(e.to_string())
    }
}

/// Map a unique-key violation on insert to `AlreadyExists`.
pub(crate) fn map_insert_error(err: sqlx::Error, what: String) -> MetadataError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            MetadataError::AlreadyExists(what)
        }
        _ => MetadataError::Database(err),
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
