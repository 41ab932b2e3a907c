//! Durable upload records for spool.
//!
//! One row per upload: owner, declared file name and chunk count, the
//! `in_progress -> completed` status and, once completed, the stored path.
//! SQLite serves single node deployments and tests; PostgreSQL serves
//! shared deployments.

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::UploadRow;
pub use postgres::PostgresStore;
pub use repos::UploadRepo;
pub use store::{MetadataStore, SqliteStore};

use spool_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
        } => {
            let store = if let Some(url) = url {
                tracing::info!("connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, *max_connections, *statement_timeout_ms).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *ssl_mode,
                    *max_connections,
                    *statement_timeout_ms,
                )
                .await?
            } else {
                return Err(MetadataError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("metadata.db");
        let config = MetadataConfig::Sqlite {
            path: db_path.clone(),
            query_timeout_secs: None,
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn from_config_rejects_incomplete_postgres() {
        let config = MetadataConfig::Postgres {
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
            database: Some("spool".to_string()),
            ssl_mode: None,
            max_connections: 5,
            statement_timeout_ms: None,
        };

        match from_config(&config).await {
            Err(MetadataError::Config(msg)) => assert!(msg.contains("'url'")),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected config error"),
        }
    }
}
