//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Byte-addressable medium holding staged chunks and final artifacts.
///
/// Keys are `/`-separated paths relative to the store root. Every write is
/// atomic: readers see either the previous object or the complete new one.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's size without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put an object atomically, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Start a streaming upload. Nothing is visible at `key` until
    /// [`StreamingUpload::finish`] succeeds.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Atomically move an object, replacing the destination if present.
    ///
    /// Fails with `NotFound` when `from` does not exist.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Remove every object under `prefix`. A missing prefix is not an error.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()>;

    /// Discard writes to `key` that were started but never finished, for
    /// example by a process that crashed mid-stream. Returns how many were
    /// removed. The object at `key` itself is untouched.
    async fn discard_unfinished(&self, _key: &str) -> StorageResult<usize> {
        Ok(0)
    }

    /// List object keys under a prefix, in no particular order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Static identifier for the backend type, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called at startup so the server refuses to run against an unusable
    /// medium.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload, discarding everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
