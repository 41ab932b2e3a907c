//! Core domain types for the spool resumable upload engine.
//!
//! This crate defines the data model shared by every other crate:
//! - Upload identifiers, lifecycle status and durable records
//! - Staging and final path derivation, including file name sanitization
//! - Configuration types loaded by the server

pub mod config;
pub mod error;
pub mod paths;
pub mod upload;

pub use error::{Error, Result};
pub use paths::{PathResolver, UploadPaths, sanitize_file_name};
pub use upload::{UploadId, UploadRecord, UploadStatus};

/// Maximum accepted chunk payload: 32 MiB.
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Default presence entry lifetime: 24 hours.
pub const DEFAULT_PRESENCE_TTL_SECS: u64 = 24 * 60 * 60;

/// Longest accepted presence entry lifetime: one year.
pub const MAX_PRESENCE_TTL_SECS: u64 = 365 * 24 * 60 * 60;
