//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataResult, map_insert_error};
use crate::models::UploadRow;
use crate::repos::UploadRepo;
use crate::repos::uploads::resolve_unapplied_completion;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UploadRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(30));

        let opts = if path == Path::new(":memory:") {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        };
        // Concurrent writers wait instead of failing with "database is locked".
        let opts = opts.busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection serializes writes and keeps an in-memory
            // database alive for the pool's lifetime.
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = query_timeout.as_secs(),
            "opened SQLite metadata store"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run a query, warning when it outlives the advisory timeout.
    /// SQLite has no statement cancellation, so slow queries still finish.
    async fn timed<T>(
        &self,
        operation: &'static str,
        query: impl Future<Output = MetadataResult<T>>,
    ) -> MetadataResult<T> {
        let started = Instant::now();
        let result = query.await;
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.query_timeout.as_millis() as u64,
                "SQLite query exceeded advisory timeout"
            );
        }
        result
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UploadRepo for SqliteStore {
    async fn create_upload(&self, upload: &UploadRow) -> MetadataResult<()> {
        self.timed("create_upload", async {
            sqlx::query(
                r#"
                INSERT INTO uploads (
                    upload_id, owner_id, file_name, total_chunks, status,
                    stored_path, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(upload.upload_id)
            .bind(&upload.owner_id)
            .bind(&upload.file_name)
            .bind(upload.total_chunks)
            .bind(&upload.status)
            .bind(&upload.stored_path)
            .bind(upload.created_at)
            .bind(upload.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, format!("upload {}", upload.upload_id)))?;
            Ok(())
        })
        .await
    }

    async fn get_upload(&self, upload_id: Uuid) -> MetadataResult<Option<UploadRow>> {
        self.timed("get_upload", async {
            let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = ?")
                .bind(upload_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        })
        .await
    }

    async fn complete_upload(
        &self,
        upload_id: Uuid,
        stored_path: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<UploadRow> {
        self.timed("complete_upload", async {
            let updated = sqlx::query_as::<_, UploadRow>(
                r#"
                UPDATE uploads
                SET status = 'completed', stored_path = ?, updated_at = ?
                WHERE upload_id = ? AND status = 'in_progress'
                RETURNING *
                "#,
            )
            .bind(stored_path)
            .bind(updated_at)
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = updated {
                return Ok(row);
            }
            let current = self.get_upload(upload_id).await?;
            resolve_unapplied_completion(upload_id, stored_path, current)
        })
        .await
    }

    async fn delete_upload(&self, upload_id: Uuid) -> MetadataResult<bool> {
        self.timed("delete_upload", async {
            let result = sqlx::query("DELETE FROM uploads WHERE upload_id = ?")
                .bind(upload_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn count_uploads_by_status(&self, status: &str) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uploads WHERE status = ?")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS uploads (
    upload_id BLOB PRIMARY KEY,
    owner_id TEXT NOT NULL,
    file_name TEXT NOT NULL,
    total_chunks INTEGER NOT NULL CHECK (total_chunks > 0),
    status TEXT NOT NULL DEFAULT 'in_progress'
        CHECK (status IN ('in_progress', 'completed')),
    stored_path TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (status = 'in_progress' OR stored_path IS NOT NULL)
);
CREATE INDEX IF NOT EXISTS idx_uploads_owner ON uploads(owner_id);
CREATE INDEX IF NOT EXISTS idx_uploads_status ON uploads(status);
"#;
