//! Builder API for wiring a cache instance.
//!
//! The cache is an explicitly constructed, explicitly passed value;
//! there is no process-global instance. Build one per logical
//! application scope and hand clones to the call sites that need it.

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::cache::TieredCache;
use crate::config::CacheConfig;
use crate::durable::DurableStore;
use crate::fetcher::RemoteFetcher;

/// Builder for [`TieredCache`].
///
/// # Example
/// ```ignore
/// let cache: TieredCache<Employee> = CacheBuilder::new(fetcher)
///     .freshness_window(Duration::from_secs(120))
///     .durable_store(Arc::new(RedisDurableStore::new(config)))
///     .build();
/// ```
pub struct CacheBuilder<V>
where
    V: Clone + Send + Sync,
{
    fetcher: Arc<dyn RemoteFetcher<V>>,
    durable_store: Option<Arc<dyn DurableStore>>,
    config: CacheConfig,
}

impl<V> CacheBuilder<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Start a builder around the remote fetcher for this key-space.
    pub fn new(fetcher: Arc<dyn RemoteFetcher<V>>) -> Self {
        CacheBuilder {
            fetcher,
            durable_store: None,
            config: CacheConfig::default(),
        }
    }

    /// Replace the whole configuration at once.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the freshness window.
    pub fn freshness_window(mut self, window: std::time::Duration) -> Self {
        self.config.freshness_window = window;
        self
    }

    /// Attach a durable store as the persistent tier.
    pub fn durable_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable_store = Some(store);
        self
    }

    /// Attach a durable store only when one is configured, keeping
    /// call sites free of conditionals.
    pub fn optional_durable_store(mut self, store: Option<Arc<dyn DurableStore>>) -> Self {
        self.durable_store = store;
        self
    }

    /// Serve stale entries immediately and refresh them in the
    /// background instead of refetching inline.
    pub fn background_refresh(mut self, enabled: bool) -> Self {
        self.config.background_refresh_enabled = enabled;
        self
    }

    /// Build the cache.
    pub fn build(self) -> TieredCache<V> {
        TieredCache::assemble(self.fetcher, self.durable_store, self.config)
    }
}
