use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::durable::{DurableError, DurableStore};
use crate::entry::DurableRecord;

/// Configuration for [`RedisDurableStore`].
#[derive(Debug, Clone)]
pub struct RedisDurableStoreConfig {
    /// Redis connection URL.
    ///
    /// Format: `redis://[username:password@]host[:port][/database]`
    pub url: String,

    /// Prefix prepended to every record key, isolating this cache's
    /// records from other users of the same database.
    pub key_prefix: String,

    /// Optional expiry applied to every record. `None` keeps records
    /// until deleted, which preserves restart-survival data even when
    /// the process stays down for a long time.
    pub ttl: Option<Duration>,
}

impl Default for RedisDurableStoreConfig {
    fn default() -> Self {
        RedisDurableStoreConfig {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "tiercache".to_string(),
            ttl: None,
        }
    }
}

/// Redis-backed durable store.
///
/// Records are stored as JSON strings under `{prefix}::{key}`. The
/// connection is established lazily on first use; an unreachable server
/// is reported as `NotAvailable`, which the cache core treats as
/// "proceed memory-only" rather than an error.
pub struct RedisDurableStore {
    config: RedisDurableStoreConfig,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisDurableStore {
    /// Create a store for the given configuration. No I/O happens until
    /// the first operation.
    pub fn new(config: RedisDurableStoreConfig) -> Self {
        RedisDurableStore {
            config,
            connection: OnceCell::new(),
        }
    }

    fn record_key(&self, key: &str) -> String {
        format!("{}::{}", self.config.key_prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, DurableError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let client = redis::Client::open(self.config.url.as_str()).map_err(|e| {
                    DurableError::NotAvailable(format!("invalid redis url: {}", e))
                })?;
                client.get_multiplexed_async_connection().await.map_err(|e| {
                    DurableError::NotAvailable(format!("failed to connect to redis: {}", e))
                })
            })
            .await?;
        Ok(conn.clone())
    }
}

fn operation_error(e: redis::RedisError) -> DurableError {
    DurableError::Operation(e.to_string())
}

#[async_trait]
impl DurableStore for RedisDurableStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn open(&self) -> Result<(), DurableError> {
        self.connection().await.map(|_| ())
    }

    async fn put(&self, key: &str, record: DurableRecord) -> Result<(), DurableError> {
        let mut conn = self.connection().await?;
        let record_key = self.record_key(key);
        let json = serde_json::to_string(&record)
            .map_err(|e| DurableError::Operation(format!("record encode failed: {}", e)))?;

        match self.config.ttl {
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1);
                let _: () = conn
                    .set_ex(&record_key, json, seconds)
                    .await
                    .map_err(operation_error)?;
            }
            None => {
                let _: () = conn.set(&record_key, json).await.map_err(operation_error)?;
            }
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, DurableError> {
        let mut conn = self.connection().await?;
        let json: Option<String> = conn
            .get(self.record_key(key))
            .await
            .map_err(operation_error)?;

        match json {
            Some(json) => {
                let record = serde_json::from_str(&json)
                    .map_err(|e| DurableError::Operation(format!("record decode failed: {}", e)))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), DurableError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(self.record_key(key))
            .await
            .map_err(operation_error)?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), DurableError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}::*", self.config.key_prefix);

        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(operation_error)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if !keys.is_empty() {
            let _: () = conn.del(&keys).await.map_err(operation_error)?;
        }

        Ok(())
    }
}
