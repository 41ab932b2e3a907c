//! Shared engine test harness.

use async_trait::async_trait;
use spool_core::{PathResolver, UploadId};
use spool_engine::UploadEngine;
use spool_metadata::{MetadataStore, SqliteStore};
use spool_presence::{MemoryPresence, PresenceError, PresenceResult, PresenceTracker};
use spool_storage::{FilesystemBackend, ObjectStore};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_TTL: Duration = Duration::from_secs(3600);

/// Engine over a temporary filesystem store, in-memory SQLite and the
/// in-memory presence tracker.
#[allow(dead_code)]
pub struct TestEngine {
    pub engine: UploadEngine,
    pub storage: Arc<FilesystemBackend>,
    pub metadata: Arc<SqliteStore>,
    pub presence: Arc<dyn PresenceTracker>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestEngine {
    pub async fn new() -> Self {
        Self::with_presence(Arc::new(MemoryPresence::new())).await
    }

    pub async fn with_presence(presence: Arc<dyn PresenceTracker>) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage = Arc::new(
            FilesystemBackend::new(temp_dir.path().join("storage"))
                .await
                .expect("Failed to create storage"),
        );
        let metadata = Arc::new(
            SqliteStore::new(":memory:", None)
                .await
                .expect("Failed to create metadata store"),
        );

        let engine = UploadEngine::new(
            storage.clone() as Arc<dyn ObjectStore>,
            metadata.clone() as Arc<dyn MetadataStore>,
            presence.clone(),
            PathResolver::default(),
            TEST_TTL,
        );

        Self {
            engine,
            storage,
            metadata,
            presence,
            _temp_dir: temp_dir,
        }
    }

    /// Absolute path of a storage key on disk.
    pub fn disk_path(&self, key: &str) -> std::path::PathBuf {
        self.storage.root().join(key)
    }
}

/// Deterministic payload of `len` bytes, distinct per `seed`.
#[allow(dead_code)]
pub fn payload(seed: u8, len: usize) -> bytes::Bytes {
    (0..len)
        .map(|i| seed.wrapping_mul(31).wrapping_add(i as u8))
        .collect::<Vec<u8>>()
        .into()
}

/// Presence tracker that delegates to memory until told to fail.
#[allow(dead_code)]
pub struct FlakyPresence {
    inner: MemoryPresence,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl FlakyPresence {
    pub fn new() -> Self {
        Self {
            inner: MemoryPresence::new(),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> PresenceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PresenceError::Config("presence backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PresenceTracker for FlakyPresence {
    async fn add(&self, upload_id: &UploadId, index: u64, ttl: Duration) -> PresenceResult<()> {
        self.check()?;
        self.inner.add(upload_id, index, ttl).await
    }

    async fn list(&self, upload_id: &UploadId) -> PresenceResult<BTreeSet<u64>> {
        self.check()?;
        self.inner.list(upload_id).await
    }

    async fn contains(&self, upload_id: &UploadId, index: u64) -> PresenceResult<bool> {
        self.check()?;
        self.inner.contains(upload_id, index).await
    }

    async fn clear(&self, upload_id: &UploadId) -> PresenceResult<()> {
        self.check()?;
        self.inner.clear(upload_id).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Presence tracker that marks the upload completed on its next lookup, the
/// way a concurrent finish would between a chunk's checks and its write.
#[allow(dead_code)]
pub struct CompletingPresence {
    inner: MemoryPresence,
    metadata: Mutex<Option<Arc<dyn MetadataStore>>>,
}

#[allow(dead_code)]
impl CompletingPresence {
    pub fn new() -> Self {
        Self {
            inner: MemoryPresence::new(),
            metadata: Mutex::new(None),
        }
    }

    pub fn complete_on_next_lookup(&self, metadata: Arc<dyn MetadataStore>) {
        *self.metadata.lock().unwrap() = Some(metadata);
    }
}

#[async_trait]
impl PresenceTracker for CompletingPresence {
    async fn add(&self, upload_id: &UploadId, index: u64, ttl: Duration) -> PresenceResult<()> {
        self.inner.add(upload_id, index, ttl).await
    }

    async fn list(&self, upload_id: &UploadId) -> PresenceResult<BTreeSet<u64>> {
        self.inner.list(upload_id).await
    }

    async fn contains(&self, upload_id: &UploadId, index: u64) -> PresenceResult<bool> {
        let metadata = self.metadata.lock().unwrap().take();
        if let Some(metadata) = metadata {
            metadata
                .complete_upload(
                    *upload_id.as_uuid(),
                    "files/completed-elsewhere",
                    time::OffsetDateTime::now_utc(),
                )
                .await
                .unwrap();
        }
        self.inner.contains(upload_id, index).await
    }

    async fn clear(&self, upload_id: &UploadId) -> PresenceResult<()> {
        self.inner.clear(upload_id).await
    }

    fn backend_name(&self) -> &'static str {
        "completing"
    }
}
