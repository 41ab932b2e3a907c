//! Resumable chunked upload engine.
//!
//! [`UploadEngine`] ties together three collaborators:
//! - an [`ObjectStore`](spool_storage::ObjectStore) holding staged chunks and
//!   final artifacts,
//! - a [`MetadataStore`](spool_metadata::MetadataStore) holding one durable
//!   record per upload,
//! - a [`PresenceTracker`](spool_presence::PresenceTracker) answering which
//!   chunks have arrived.
//!
//! Every operation is idempotent or safely repeatable, so callers can retry
//! any failure without coordinating with the server.

pub mod engine;
pub mod error;
pub mod lease;
pub mod merge;
pub mod types;

pub use engine::UploadEngine;
pub use error::{EngineError, EngineResult};
pub use lease::{MergeLease, MergeLeases};
pub use types::{Artifact, ChunkAck, FinishedUpload, UploadSummary};
