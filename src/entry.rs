use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CacheError;

/// Version stamped into every entry and durable record. Bump when the
/// payload shape changes; durable records from other versions are
/// ignored on read.
pub const SCHEMA_VERSION: u32 = 1;

/// A cached value with its provenance.
///
/// Entries are immutable once inserted into the ephemeral tier; a
/// refresh replaces the whole entry rather than mutating it in place.
/// For a given key, `fetched_at` never decreases across successive
/// successful fetches.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The normalized cache key this entry belongs to.
    pub key: String,

    /// The cached payload.
    pub payload: V,

    /// Unix timestamp in milliseconds at which the fetch completed.
    pub fetched_at: i64,

    /// Schema version of the payload at fetch time.
    pub schema_version: u32,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry stamped with the current schema version.
    pub fn new(key: impl Into<String>, payload: V, fetched_at: i64) -> Self {
        CacheEntry {
            key: key.into(),
            payload,
            fetched_at,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Check if the entry is within the freshness window.
    pub fn is_fresh(&self, now_ms: i64, window: Duration) -> bool {
        now_ms - self.fetched_at < window.as_millis() as i64
    }
}

/// Serialized form of a cache entry as held by the durable tier.
///
/// Durable adapters are payload-agnostic; the payload travels as a JSON
/// string the way the cache core encoded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableRecord {
    /// JSON-encoded payload.
    pub payload: String,

    /// Unix timestamp in milliseconds at which the fetch completed.
    pub fetched_at: i64,

    /// Schema version of the payload at write time.
    pub schema_version: u32,
}

impl DurableRecord {
    /// Encode an entry for the durable tier.
    pub fn from_entry<V: Serialize>(entry: &CacheEntry<V>) -> Result<Self, CacheError> {
        let payload = serde_json::to_string(&entry.payload)
            .map_err(|e| CacheError::fetch(entry.key.as_str(), format!("payload encode failed: {}", e)))?;
        Ok(DurableRecord {
            payload,
            fetched_at: entry.fetched_at,
            schema_version: entry.schema_version,
        })
    }

    /// Decode back into a typed entry for the given key.
    pub fn into_entry<V>(self, key: &str) -> Result<CacheEntry<V>, CacheError>
    where
        V: for<'de> Deserialize<'de>,
    {
        let payload: V = serde_json::from_str(&self.payload)
            .map_err(|e| CacheError::fetch(key, format!("payload decode failed: {}", e)))?;
        Ok(CacheEntry {
            key: key.to_string(),
            payload,
            fetched_at: self.fetched_at,
            schema_version: self.schema_version,
        })
    }

    /// Whether this record was written by the current schema version.
    pub fn is_current_schema(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}
