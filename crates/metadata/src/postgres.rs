//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataResult, map_insert_error};
use crate::models::UploadRow;
use crate::repos::UploadRepo;
use crate::repos::uploads::resolve_unapplied_completion;
use crate::store::MetadataStore;
use async_trait::async_trait;
use spool_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Split the schema into individual statements; prepared statements
/// cannot carry more than one.
fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect using a full connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Connect using individual parameters, so the password can come from
    /// the environment rather than a URL in a config file.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            opts = opts.ssl_mode(match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            });
        }

        tracing::info!(
            host,
            port,
            database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "connecting to PostgreSQL"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UploadRepo for PostgresStore {
    async fn create_upload(&self, upload: &UploadRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO uploads (
                upload_id, owner_id, file_name, total_chunks, status,
                stored_path, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
    }

    async fn get_upload(&self, upload_id: Uuid) -> MetadataResult<Option<UploadRow>> {
        let row = sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = $1")
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn complete_upload(
        &self,
        upload_id: Uuid,
        stored_path: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<UploadRow> {
        let updated = sqlx::query_as::<_, UploadRow>(
            r#"
            UPDATE uploads
            SET status = 'completed', stored_path = $1, updated_at = $2
            WHERE upload_id = $3 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(stored_path)
        .bind(updated_at)
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Ok(row),
            None => {
                let current = self.get_upload(upload_id).await?;
                resolve_unapplied_completion(upload_id, stored_path, current)
            }
        }
    }

    async fn delete_upload(&self, upload_id: Uuid) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM uploads WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_uploads_by_status(&self, status: &str) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uploads WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
