//! Redis-backed presence tracker.
//!
//! Each upload maps to one Redis set, `<prefix><upload_id>:chunks`, whose
//! members are decimal chunk indices. SADD and EXPIRE run in one MULTI
//! block so a set never exists without an expiry.

use crate::error::PresenceResult;
use crate::traits::PresenceTracker;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use spool_core::UploadId;
use std::collections::BTreeSet;
use std::time::Duration;

/// Presence tracker shared between server instances through Redis.
#[derive(Clone)]
pub struct RedisPresence {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisPresence {
    /// Connect to Redis. The connection manager reconnects on its own after
    /// transient failures.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> PresenceResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, upload_id: &UploadId) -> String {
        format!("{}{}:chunks", self.key_prefix, upload_id)
    }
}

/// Largest expiry sent to Redis; far larger values are rejected by the server.
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Redis expiries have one second resolution; round up so short TTLs
/// never become "expire immediately".
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));
    secs.clamp(1, MAX_TTL_SECS)
}

#[async_trait]
impl PresenceTracker for RedisPresence {
    async fn add(&self, upload_id: &UploadId, index: u64, ttl: Duration) -> PresenceResult<()> {
        let key = self.key(upload_id);
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&key)
            .arg(index)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list(&self, upload_id: &UploadId) -> PresenceResult<BTreeSet<u64>> {
        let key = self.key(upload_id);
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        let mut indices = BTreeSet::new();
        for member in members {
            match member.parse::<u64>() {
                Ok(index) => {
                    indices.insert(index);
                }
                Err(_) => {
                    tracing::warn!(%upload_id, member, "ignoring non-numeric presence member");
                }
            }
        }
        Ok(indices)
    }

    async fn contains(&self, upload_id: &UploadId, index: u64) -> PresenceResult<bool> {
        let key = self.key(upload_id);
        let mut conn = self.conn.clone();
        let present: bool = redis::cmd("SISMEMBER")
            .arg(&key)
            .arg(index)
            .query_async(&mut conn)
            .await?;
        Ok(present)
    }

    async fn clear(&self, upload_id: &UploadId) -> PresenceResult<()> {
        let key = self.key(upload_id);
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn health_check(&self) -> PresenceResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
