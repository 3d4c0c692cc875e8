//! Durable tier contract and the cache core's failure-absorbing wrapper.
//!
//! The durable store mirrors the ephemeral tier into persistent local
//! storage so cached data survives process restarts. It is strictly
//! best-effort: a durable outage degrades the cache to memory-only
//! operation, it never breaks a read.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::entry::DurableRecord;

/// Error type for durable store operations.
///
/// These errors never escalate into a [`CacheError`](crate::CacheError):
/// the cache core absorbs and logs them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DurableError {
    /// The underlying storage cannot be opened or reached. The cache
    /// proceeds memory-only for the rest of the process lifetime.
    #[error("durable store not available: {0}")]
    NotAvailable(String),

    /// An individual operation failed after the store was opened.
    #[error("durable store operation failed: {0}")]
    Operation(String),
}

/// A keyed record store used as the cache's persistent tier.
///
/// Implementations must support concurrent use across distinct keys
/// without corrupting unrelated keys' data; cross-key atomicity is not
/// required.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// A name for tracing.
    ///
    /// # Example
    /// - "memory"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Open the underlying storage. Idempotent, safe to call multiple
    /// times. Reports `NotAvailable` rather than panicking when the
    /// storage cannot be reached.
    async fn open(&self) -> Result<(), DurableError>;

    /// Upsert the record for a key.
    async fn put(&self, key: &str, record: DurableRecord) -> Result<(), DurableError>;

    /// Return the record for a key, or `None` when missing.
    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, DurableError>;

    /// Remove the record for a key.
    async fn delete(&self, key: &str) -> Result<(), DurableError>;

    /// Remove every record held by this store.
    async fn clear(&self) -> Result<(), DurableError>;
}

/// Lazy-opened handle to the durable store.
///
/// The store is opened once per process, on first use. Every failure is
/// logged and swallowed here so the read path upstream only ever sees
/// `Option<DurableRecord>`.
pub(crate) struct DurableTier {
    store: Option<Arc<dyn DurableStore>>,
    available: OnceCell<bool>,
}

impl DurableTier {
    pub(crate) fn new(store: Option<Arc<dyn DurableStore>>) -> Self {
        DurableTier {
            store,
            available: OnceCell::new(),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self::new(None)
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Open the store on first use; `None` when no store is configured
    /// or the storage reported itself unavailable.
    async fn ready(&self) -> Option<&Arc<dyn DurableStore>> {
        let store = self.store.as_ref()?;
        let available = self
            .available
            .get_or_init(|| async {
                match store.open().await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            "durable tier '{}' unavailable, continuing memory-only: {}",
                            store.name(),
                            e
                        );
                        false
                    }
                }
            })
            .await;

        if *available {
            Some(store)
        } else {
            None
        }
    }

    /// Read a record, discarding records written by another schema
    /// version.
    pub(crate) async fn read(&self, key: &str) -> Option<DurableRecord> {
        let store = self.ready().await?;
        match store.get(key).await {
            Ok(Some(record)) => {
                if record.is_current_schema() {
                    Some(record)
                } else {
                    debug!("discarding durable record for '{}' with old schema version", key);
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!("durable read for '{}' failed: {}", key, e);
                None
            }
        }
    }

    pub(crate) async fn write(&self, key: &str, record: DurableRecord) {
        if let Some(store) = self.ready().await {
            if let Err(e) = store.put(key, record).await {
                warn!("durable write for '{}' failed: {}", key, e);
            }
        }
    }

    pub(crate) async fn remove(&self, key: &str) {
        if let Some(store) = self.ready().await {
            if let Err(e) = store.delete(key).await {
                warn!("durable delete for '{}' failed: {}", key, e);
            }
        }
    }

    pub(crate) async fn clear_all(&self) {
        if let Some(store) = self.ready().await {
            if let Err(e) = store.clear().await {
                warn!("durable clear failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SCHEMA_VERSION;

    struct UnavailableStore;

    #[async_trait]
    impl DurableStore for UnavailableStore {
        fn name(&self) -> &'static str {
            "unavailable"
        }

        async fn open(&self) -> Result<(), DurableError> {
            Err(DurableError::NotAvailable("simulated outage".into()))
        }

        async fn put(&self, _key: &str, _record: DurableRecord) -> Result<(), DurableError> {
            panic!("must not be called once open() failed");
        }

        async fn get(&self, _key: &str) -> Result<Option<DurableRecord>, DurableError> {
            panic!("must not be called once open() failed");
        }

        async fn delete(&self, _key: &str) -> Result<(), DurableError> {
            panic!("must not be called once open() failed");
        }

        async fn clear(&self) -> Result<(), DurableError> {
            panic!("must not be called once open() failed");
        }
    }

    #[tokio::test]
    async fn test_unavailable_store_degrades_to_memory_only() {
        let tier = DurableTier::new(Some(Arc::new(UnavailableStore)));

        assert!(tier.read("k").await.is_none());
        // Writes and removals become no-ops rather than panics.
        let record = DurableRecord {
            payload: "1".to_string(),
            fetched_at: 0,
            schema_version: SCHEMA_VERSION,
        };
        tier.write("k", record).await;
        tier.remove("k").await;
        tier.clear_all().await;
    }

    #[tokio::test]
    async fn test_disabled_tier_is_inert() {
        let tier = DurableTier::disabled();
        assert!(!tier.is_enabled());
        assert!(tier.read("k").await.is_none());
    }

    #[tokio::test]
    async fn test_old_schema_records_are_ignored() {
        use crate::stores::memory::MemoryDurableStore;

        let store = Arc::new(MemoryDurableStore::new());
        store
            .put(
                "k",
                DurableRecord {
                    payload: "1".to_string(),
                    fetched_at: 0,
                    schema_version: SCHEMA_VERSION + 7,
                },
            )
            .await
            .unwrap();

        let tier = DurableTier::new(Some(store));
        assert!(tier.read("k").await.is_none());
    }
}
