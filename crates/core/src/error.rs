//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid upload ID: {0}")]
    InvalidUploadId(String),

    #[error("invalid upload status: {0}")]
    InvalidStatus(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid chunk key: {0}")]
    InvalidChunkKey(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
