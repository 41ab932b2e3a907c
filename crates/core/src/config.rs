//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted chunk payload in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Largest accepted `total_chunks` for a new upload.
    #[serde(default = "default_max_total_chunks")]
    pub max_total_chunks: u64,
    /// Request header carrying the authenticated owner identity.
    /// Must be set by a trusted gateway in front of the server.
    #[serde(default = "default_owner_header")]
    pub owner_header: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_max_total_chunks() -> u64 {
    1_000_000
}

fn default_owner_header() -> String {
    "x-spool-owner".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_chunk_size: default_max_chunk_size(),
            max_total_chunks: default_max_total_chunks(),
            owner_header: default_owner_header(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_size == 0 {
            return Err("server.max_chunk_size must be greater than zero".to_string());
        }
        if self.max_total_chunks == 0 {
            return Err("server.max_total_chunks must be greater than zero".to_string());
        }
        if self.owner_header.trim().is_empty() {
            return Err("server.owner_header must not be empty".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory holding the staging and files areas.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem storage requires a non-empty 'path'".to_string())
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single node deployments and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Advisory query timeout in seconds. Slow queries are logged,
        /// never cancelled.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over the individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer SPOOL_METADATA__PASSWORD over storing this in a file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds, enforced by PostgreSQL.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("postgres max_connections must be greater than zero".to_string());
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) | (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

/// Presence tracker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PresenceConfig {
    /// In-process tracker. Presence is lost on restart; clients then resend
    /// chunks that are already staged, which is harmless.
    Memory {
        /// How often expired sets are purged.
        #[serde(default = "default_sweep_interval_secs")]
        sweep_interval_secs: u64,
    },
    /// Redis-backed tracker shared by several server instances.
    Redis {
        /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
        url: String,
        /// Key prefix; the full key is `<prefix><upload_id>:chunks`.
        #[serde(default = "default_redis_key_prefix")]
        key_prefix: String,
    },
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_redis_key_prefix() -> String {
    "upload:".to_string()
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self::Memory {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl PresenceConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            PresenceConfig::Memory {
                sweep_interval_secs,
            } if *sweep_interval_secs == 0 => {
                Err("presence sweep_interval_secs must be greater than zero".to_string())
            }
            PresenceConfig::Memory { .. } => Ok(()),
            PresenceConfig::Redis { url, .. } => {
                if url.starts_with("redis://")
                    || url.starts_with("rediss://")
                    || url.starts_with("redis+unix://")
                    || url.starts_with("unix://")
                {
                    Ok(())
                } else {
                    Err(format!("presence redis url has an unsupported scheme: {url}"))
                }
            }
        }
    }
}

/// Upload engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of a presence set, refreshed on every received chunk.
    #[serde(default = "default_presence_ttl_secs")]
    pub presence_ttl_secs: u64,
    /// Storage area holding per-upload staging directories.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    /// Storage area holding completed artifacts.
    #[serde(default = "default_files_dir")]
    pub files_dir: String,
}

fn default_presence_ttl_secs() -> u64 {
    crate::DEFAULT_PRESENCE_TTL_SECS
}

fn default_staging_dir() -> String {
    "tmp".to_string()
}

fn default_files_dir() -> String {
    "files".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            presence_ttl_secs: default_presence_ttl_secs(),
            staging_dir: default_staging_dir(),
            files_dir: default_files_dir(),
        }
    }
}

impl EngineConfig {
    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }

    /// Build the path resolver for the configured areas.
    pub fn path_resolver(&self) -> Result<crate::PathResolver, String> {
        crate::PathResolver::new(self.staging_dir.clone(), self.files_dir.clone())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.presence_ttl_secs == 0 {
            return Err("engine.presence_ttl_secs must be greater than zero".to_string());
        }
        if self.presence_ttl_secs > crate::MAX_PRESENCE_TTL_SECS {
            return Err(format!(
                "engine.presence_ttl_secs must be at most {}",
                crate::MAX_PRESENCE_TTL_SECS
            ));
        }
        self.path_resolver().map(|_| ())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata and
    /// the in-memory presence tracker.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Validate every section, reporting the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.metadata.validate()?;
        self.presence.validate()?;
        self.engine.validate()
    }
}
