use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::durable::{DurableError, DurableStore};
use crate::entry::DurableRecord;

/// In-memory durable store.
///
/// Keeps records in a `HashMap` behind an `RwLock`. Nothing survives a
/// process restart, so this is only a real durable tier in tests; it is
/// also a convenient stand-in when a deployment wants the cache wired
/// up uniformly but has no local storage.
#[derive(Default)]
pub struct MemoryDurableStore {
    records: RwLock<HashMap<String, DurableRecord>>,
}

impl MemoryDurableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self) -> Result<(), DurableError> {
        Ok(())
    }

    async fn put(&self, key: &str, record: DurableRecord) -> Result<(), DurableError> {
        self.records.write().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, DurableError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), DurableError> {
        self.records.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), DurableError> {
        self.records.write().await.clear();
        Ok(())
    }
}
