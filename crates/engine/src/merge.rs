//! Merging staged chunks into the final artifact, and upload removal.
//!
//! A merge writes every chunk in ascending index order into a `.part` file
//! next to the final location, then renames it into place. The rename is the
//! commit point for the bytes; the metadata update that follows is the commit
//! point for the status. Each step is repeatable, so a merge interrupted
//! anywhere can be finished by calling `finish_upload` again:
//!
//! - before the rename: the `.part` file is rewritten from scratch;
//! - after the rename: the final artifact is reused as-is;
//! - after the status update: the call is an idempotent success.

use crate::engine::UploadEngine;
use crate::error::{EngineError, EngineResult};
use crate::types::FinishedUpload;
use futures::StreamExt;
use spool_core::{UploadId, UploadPaths, UploadRecord, UploadStatus};
use spool_storage::StreamingUpload;
use std::collections::BTreeMap;
use std::time::Instant;
use time::OffsetDateTime;

impl UploadEngine {
    /// Merge all staged chunks into the final artifact and mark the upload
    /// completed.
    ///
    /// Fails with [`EngineError::Incomplete`] naming every missing index when
    /// any chunk has not been staged; the upload stays resumable.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn finish_upload(&self, upload_id: &UploadId) -> EngineResult<FinishedUpload> {
        let _lease = self.leases.acquire(*upload_id).await;
        let started = Instant::now();

        let record = self.get_record(upload_id).await?;
        let paths = self.paths.paths(upload_id, &record.file_name);

        if let Some(stored_path) = record.stored_path.clone() {
            // Leftovers from an earlier merge that failed during cleanup.
            self.cleanup_staging(upload_id, &paths).await;
            let size = self.storage.head(&stored_path).await?.size;
            tracing::debug!(stored_path, "upload already completed");
            return Ok(FinishedUpload {
                upload_id: *upload_id,
                stored_path,
                size,
            });
        }
        record
            .status
            .transition_to(UploadStatus::Completed)
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let size = if self.storage.exists(&paths.final_path).await? {
            // The rename of an earlier attempt landed but the record was
            // never updated.
            tracing::info!(final_path = %paths.final_path, "reusing merged artifact");
            self.storage.head(&paths.final_path).await?.size
        } else {
            let staged = self.staged_chunks(&record).await?;
            let missing: Vec<u64> = (0..record.total_chunks)
                .filter(|index| !staged.contains_key(index))
                .collect();
            if !missing.is_empty() {
                tracing::info!(
                    missing_count = missing.len(),
                    total_chunks = record.total_chunks,
                    "finish rejected: upload incomplete"
                );
                return Err(EngineError::Incomplete {
                    upload_id: *upload_id,
                    missing,
                });
            }

            let size = self.write_merged(&paths, &staged).await?;
            self.commit_merged(&paths).await?;
            size
        };

        self.metadata
            .complete_upload(
                *upload_id.as_uuid(),
                &paths.final_path,
                OffsetDateTime::now_utc(),
            )
            .await?;

        self.cleanup_staging(upload_id, &paths).await;

        tracing::info!(
            stored_path = %paths.final_path,
            size,
            total_chunks = record.total_chunks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upload merged"
        );
        Ok(FinishedUpload {
            upload_id: *upload_id,
            stored_path: paths.final_path,
            size,
        })
    }

    /// Remove an upload: presence set, staged chunks, merge leftovers
    /// (including unfinished `.part` writes), the final artifact and finally
    /// the record.
    ///
    /// Files go before the record so a failed call can simply be repeated.
    #[tracing::instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn delete_upload(&self, upload_id: &UploadId) -> EngineResult<()> {
        let _lease = self.leases.acquire(*upload_id).await;

        let record = self.get_record(upload_id).await?;
        let paths = self.paths.paths(upload_id, &record.file_name);

        self.presence.clear(upload_id).await?;
        self.storage.delete_prefix(&paths.staging_dir).await?;
        self.storage
            .discard_unfinished(&paths.staging_final_path)
            .await?;
        for key in [&paths.staging_final_path, &paths.final_path] {
            match self.storage.delete(key).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.metadata.delete_upload(*upload_id.as_uuid()).await?;

        tracing::info!(status = %record.status, "upload deleted");
        Ok(())
    }

    /// Staged chunk keys by index, read from the staging listing.
    ///
    /// Indices outside the declared range are ignored.
    pub(crate) async fn staged_chunks(
        &self,
        record: &UploadRecord,
    ) -> EngineResult<BTreeMap<u64, String>> {
        let upload_id = &record.upload_id;
        let keys = self
            .storage
            .list(&self.paths.staging_prefix(upload_id))
            .await?;

        Ok(keys
            .into_iter()
            .filter_map(|key| {
                let index = self.paths.chunk_index_of(upload_id, &key)?;
                record.contains_index(index).then_some((index, key))
            })
            .collect())
    }

    /// Stream every staged chunk, in index order, into the `.part` file.
    async fn write_merged(
        &self,
        paths: &UploadPaths,
        staged: &BTreeMap<u64, String>,
    ) -> EngineResult<u64> {
        let mut upload = self.storage.put_stream(&paths.staging_final_path).await?;

        for key in staged.values() {
            if let Err(e) = self.copy_into(key, upload.as_mut()).await {
                if let Err(abort_err) = upload.abort().await {
                    tracing::warn!(
                        error = %abort_err,
                        key = %paths.staging_final_path,
                        "failed to abort partial merge"
                    );
                }
                return Err(e);
            }
        }

        Ok(upload.finish().await?)
    }

    async fn copy_into(&self, key: &str, upload: &mut dyn StreamingUpload) -> EngineResult<()> {
        let mut stream = self.storage.get_stream(key).await?;
        while let Some(block) = stream.next().await {
            upload.write(block?).await?;
        }
        Ok(())
    }

    /// Move the `.part` file onto the final location.
    async fn commit_merged(&self, paths: &UploadPaths) -> EngineResult<()> {
        let renamed = self
            .storage
            .rename(&paths.staging_final_path, &paths.final_path)
            .await;
        match renamed {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                // A concurrent finisher in another process won the rename.
                if self.storage.exists(&paths.final_path).await? {
                    tracing::debug!(final_path = %paths.final_path, "rename lost to concurrent merge");
                    Ok(())
                } else {
                    Err(e.into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of everything a completed upload no longer needs.
    /// Leftovers are harmless and are retried by the next `finish_upload`.
    async fn cleanup_staging(&self, upload_id: &UploadId, paths: &UploadPaths) {
        if let Err(e) = self.presence.clear(upload_id).await {
            tracing::warn!(error = %e, "failed to clear presence set");
        }
        if let Err(e) = self.storage.delete_prefix(&paths.staging_dir).await {
            tracing::warn!(error = %e, staging_dir = %paths.staging_dir, "failed to remove staged chunks");
        }
        match self.storage.delete(&paths.staging_final_path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(error = %e, key = %paths.staging_final_path, "failed to remove merge leftover");
            }
        }
        match self
            .storage
            .discard_unfinished(&paths.staging_final_path)
            .await
        {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "discarded unfinished merge writes"),
            Err(e) => {
                tracing::warn!(error = %e, key = %paths.staging_final_path, "failed to discard unfinished merge writes");
            }
        }
    }
}
