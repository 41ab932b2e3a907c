//! Upload engine: identity assignment, chunk ingestion and progress queries.
//!
//! The merge and removal paths live in [`crate::merge`].

use crate::error::{EngineError, EngineResult};
use crate::lease::MergeLeases;
use crate::types::{Artifact, ChunkAck, UploadSummary};
use bytes::Bytes;
use spool_core::config::EngineConfig;
use spool_core::{PathResolver, UploadId, UploadRecord};
use spool_metadata::{MetadataStore, UploadRow};
use spool_presence::PresenceTracker;
use spool_storage::ObjectStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Resumable chunked upload engine.
///
/// Cheap to clone; all state lives in the three backing stores plus the
/// in-process merge leases.
#[derive(Clone)]
pub struct UploadEngine {
    pub(crate) storage: Arc<dyn ObjectStore>,
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) presence: Arc<dyn PresenceTracker>,
    pub(crate) paths: PathResolver,
    pub(crate) presence_ttl: Duration,
    pub(crate) leases: MergeLeases,
}

impl UploadEngine {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        presence: Arc<dyn PresenceTracker>,
        paths: PathResolver,
        presence_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            metadata,
            presence,
            paths,
            presence_ttl,
            leases: MergeLeases::new(),
        }
    }

    /// Build an engine from the `[engine]` configuration section.
    pub fn from_config(
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        presence: Arc<dyn PresenceTracker>,
        config: &EngineConfig,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidArgument)?;
        let paths = config
            .path_resolver()
            .map_err(EngineError::InvalidArgument)?;
        Ok(Self::new(
            storage,
            metadata,
            presence,
            paths,
            config.presence_ttl(),
        ))
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStore> {
        &self.storage
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn presence(&self) -> &Arc<dyn PresenceTracker> {
        &self.presence
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// Start a new upload and return its server-assigned ID.
    ///
    /// Only the durable record is written; the staging directory appears with
    /// the first chunk.
    #[tracing::instrument(skip(self))]
    pub async fn init_upload(
        &self,
        file_name: &str,
        total_chunks: u64,
        owner_id: &str,
    ) -> EngineResult<UploadId> {
        if owner_id.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "owner_id must not be empty".to_string(),
            ));
        }
        if file_name.is_empty() {
            return Err(EngineError::InvalidArgument(
                "file_name must not be empty".to_string(),
            ));
        }
        if total_chunks == 0 {
            return Err(EngineError::InvalidArgument(
                "total_chunks must be at least 1".to_string(),
            ));
        }
        if i64::try_from(total_chunks).is_err() {
            return Err(EngineError::InvalidArgument(format!(
                "total_chunks {total_chunks} is too large"
            )));
        }

        let record = UploadRecord::new(owner_id, file_name, total_chunks);
        let row = UploadRow::try_from(&record)?;
        self.metadata.create_upload(&row).await?;

        tracing::info!(
            upload_id = %record.upload_id,
            owner_id,
            file_name = %record.file_name,
            total_chunks,
            "upload initialized"
        );
        Ok(record.upload_id)
    }

    /// Stage one chunk.
    ///
    /// Repeating a chunk that is already staged is a no-op reported as
    /// [`ChunkAck::Duplicate`]. A failed call leaves the chunk unreceived, so
    /// the caller simply sends it again.
    #[tracing::instrument(skip(self, payload), fields(upload_id = %upload_id, size = payload.len()))]
    pub async fn receive_chunk(
        &self,
        upload_id: &UploadId,
        chunk_index: u64,
        total_chunks: u64,
        payload: Bytes,
    ) -> EngineResult<ChunkAck> {
        if chunk_index >= total_chunks {
            return Err(EngineError::InvalidArgument(format!(
                "chunk index {chunk_index} out of range for {total_chunks} chunks"
            )));
        }

        let record = self.get_record(upload_id).await?;
        if record.is_completed() {
            return Err(EngineError::InvalidArgument(format!(
                "upload {upload_id} is already completed"
            )));
        }
        if record.total_chunks != total_chunks {
            return Err(EngineError::InvalidArgument(format!(
                "total_chunks mismatch: upload declared {}, request claims {}",
                record.total_chunks, total_chunks
            )));
        }

        let key = self.paths.chunk_key(upload_id, chunk_index);

        // Presence alone is not trusted: a tracked index whose staged file
        // vanished is written again.
        if self.presence.contains(upload_id, chunk_index).await?
            && self.storage.exists(&key).await?
        {
            tracing::debug!(chunk_index, "duplicate chunk skipped");
            return Ok(ChunkAck::Duplicate);
        }

        // The write is atomic, so an interrupted put never leaves a partial
        // chunk under `key`.
        self.storage.put(&key, payload).await?;

        // A finish that completed while the chunk was being written has
        // already run its cleanup, so the chunk would be left behind.
        if self.get_record(upload_id).await?.is_completed() {
            let staging = self.paths.staging_prefix(upload_id);
            if let Err(e) = self.storage.delete_prefix(&staging).await {
                tracing::warn!(error = %e, staging_dir = %staging, "failed to remove late chunk");
            }
            return Err(EngineError::InvalidArgument(format!(
                "upload {upload_id} was completed while chunk {chunk_index} was being staged"
            )));
        }

        self.presence
            .add(upload_id, chunk_index, self.presence_ttl)
            .await?;

        tracing::debug!(chunk_index, "chunk staged");
        Ok(ChunkAck::Stored)
    }

    /// Indices received so far, for computing what still needs sending.
    ///
    /// A completed upload reports its full range.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn list_received_chunks(&self, upload_id: &UploadId) -> EngineResult<BTreeSet<u64>> {
        let record = self.get_record(upload_id).await?;
        if record.is_completed() {
            return Ok((0..record.total_chunks).collect());
        }
        Ok(self.received_chunks(&record).await?.into_keys().collect())
    }

    /// Record plus live progress.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn get_metadata(&self, upload_id: &UploadId) -> EngineResult<UploadSummary> {
        let record = self.get_record(upload_id).await?;

        if let Some(stored_path) = record.stored_path.as_deref() {
            let size = self.storage.head(stored_path).await?.size;
            let received = (0..record.total_chunks).collect();
            return Ok(UploadSummary {
                record,
                size,
                received,
            });
        }

        let staged = self.received_chunks(&record).await?;
        let mut size = 0u64;
        for key in staged.values() {
            match self.storage.head(key).await {
                Ok(meta) => size += meta.size,
                // Removed by a concurrent merge or delete.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        let received = staged.into_keys().collect();

        Ok(UploadSummary {
            record,
            size,
            received,
        })
    }

    /// Open a completed upload's final artifact for streaming.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn open_artifact(&self, upload_id: &UploadId) -> EngineResult<Artifact> {
        let record = self.get_record(upload_id).await?;
        let Some(stored_path) = record.stored_path.clone() else {
            return Err(EngineError::InvalidArgument(format!(
                "upload {upload_id} is not completed"
            )));
        };

        let size = self.storage.head(&stored_path).await?.size;
        let stream = self.storage.get_stream(&stored_path).await?;
        Ok(Artifact {
            record,
            size,
            stream,
        })
    }

    /// Staged chunks of an in-progress upload, with the presence set
    /// brought back in line with them.
    ///
    /// The staging listing is authoritative. Indices the tracker lost to a
    /// restart or an expired TTL are added back; failing to do so only costs
    /// a redundant rewrite when the client resends.
    pub(crate) async fn received_chunks(
        &self,
        record: &UploadRecord,
    ) -> EngineResult<BTreeMap<u64, String>> {
        let upload_id = &record.upload_id;
        let staged = self.staged_chunks(record).await?;
        if staged.is_empty() {
            return Ok(staged);
        }

        let tracked = match self.presence.list(upload_id).await {
            Ok(tracked) => tracked,
            Err(e) => {
                tracing::warn!(error = %e, "presence unavailable, answering from staging area");
                return Ok(staged);
            }
        };
        let lost: Vec<u64> = staged
            .keys()
            .filter(|index| !tracked.contains(*index))
            .copied()
            .collect();
        if !lost.is_empty() {
            tracing::info!(restored = lost.len(), "restoring presence from staging area");
            for index in lost {
                if let Err(e) = self.presence.add(upload_id, index, self.presence_ttl).await {
                    tracing::warn!(error = %e, chunk_index = index, "failed to restore presence");
                    break;
                }
            }
        }
        Ok(staged)
    }

    /// Fetch the durable record, mapping absence to `NotFound`.
    pub async fn get_record(&self, upload_id: &UploadId) -> EngineResult<UploadRecord> {
        let row = self
            .metadata
            .get_upload(*upload_id.as_uuid())
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("upload {upload_id}")))?;
        Ok(UploadRecord::try_from(row)?)
    }
}

impl std::fmt::Debug for UploadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadEngine")
            .field("storage", &self.storage.backend_name())
            .field("presence", &self.presence.backend_name())
            .field("paths", &self.paths)
            .field("presence_ttl", &self.presence_ttl)
            .finish_non_exhaustive()
    }
}
