//! Presence tracker error types.

use thiserror::Error;

/// Presence tracker operation errors.
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for presence operations.
pub type PresenceResult<T> = std::result::Result<T, PresenceError>;
