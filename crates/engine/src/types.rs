//! Values returned by engine operations.

use spool_core::{UploadId, UploadRecord};
use spool_storage::ByteStream;
use std::collections::BTreeSet;

/// Outcome of a successful `receive_chunk`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkAck {
    /// The payload was written to staging.
    Stored,
    /// The chunk was already staged; the payload was discarded.
    Duplicate,
}

impl ChunkAck {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkAck::Stored => "stored",
            ChunkAck::Duplicate => "duplicate",
        }
    }
}

/// Result of a successful merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedUpload {
    pub upload_id: UploadId,
    /// Storage key of the final artifact.
    pub stored_path: String,
    /// Artifact size in bytes.
    pub size: u64,
}

/// Point-in-time view of an upload.
#[derive(Clone, Debug)]
pub struct UploadSummary {
    pub record: UploadRecord,
    /// Final artifact size once completed, otherwise bytes staged so far.
    pub size: u64,
    /// Chunk indices known to have arrived.
    pub received: BTreeSet<u64>,
}

impl UploadSummary {
    pub fn received_count(&self) -> u64 {
        self.received.len() as u64
    }
}

/// Open handle on a completed upload's final artifact.
pub struct Artifact {
    pub record: UploadRecord,
    pub size: u64,
    pub stream: ByteStream,
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("record", &self.record)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
