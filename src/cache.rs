use futures::future::join_all;
use moka::sync::Cache as MokaCache;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::durable::{DurableStore, DurableTier};
use crate::entry::{CacheEntry, DurableRecord};
use crate::error::CacheError;
use crate::fetcher::RemoteFetcher;
use crate::subscription::{SubscriberCallback, SubscriberRegistry, Subscription};
use crate::utils::{normalize_path, now_ms};

/// Outcome shared by every caller coalesced onto one fetch.
type FetchResult<V> = Result<Option<V>, CacheError>;

/// Read-only counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held in the ephemeral tier.
    pub ephemeral_entries: u64,
    /// Fetches currently in flight.
    pub in_flight_fetches: usize,
    /// Registered subscriber callbacks across all keys.
    pub subscriber_count: usize,
}

/// Two-tier read-through cache with single-flight coalescing.
///
/// Reads resolve in order: fresh ephemeral entry, in-flight fetch for
/// the same key, remote source. A successful fetch populates the
/// ephemeral tier, mirrors to the durable tier (best-effort, detached)
/// and notifies subscribers. A failed fetch is given one fallback
/// chance (stale ephemeral entry, then a fresh durable record) before
/// the error is surfaced.
///
/// The cache is an explicitly constructed value; clone it freely, all
/// clones share one set of tiers and one in-flight table. Constructing
/// a second cache gives fully independent tiers and coalescing.
pub struct TieredCache<V>
where
    V: Clone + Send + Sync,
{
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for TieredCache<V>
where
    V: Clone + Send + Sync,
{
    fn clone(&self) -> Self {
        TieredCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CacheInner<V>
where
    V: Clone + Send + Sync,
{
    config: CacheConfig,
    fetcher: Arc<dyn RemoteFetcher<V>>,
    ephemeral: MokaCache<String, Arc<CacheEntry<V>>>,
    durable: DurableTier,
    in_flight: Mutex<HashMap<String, watch::Receiver<Option<FetchResult<V>>>>>,
    subscribers: SubscriberRegistry<V>,
}

impl<V> TieredCache<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Create a memory-only cache. Use [`CacheBuilder`] to attach a
    /// durable store.
    ///
    /// [`CacheBuilder`]: crate::CacheBuilder
    pub fn new(fetcher: Arc<dyn RemoteFetcher<V>>, config: CacheConfig) -> Self {
        Self::assemble(fetcher, None, config)
    }

    pub(crate) fn assemble(
        fetcher: Arc<dyn RemoteFetcher<V>>,
        durable_store: Option<Arc<dyn DurableStore>>,
        config: CacheConfig,
    ) -> Self {
        let durable = if config.durable_tier_enabled {
            DurableTier::new(durable_store)
        } else {
            DurableTier::disabled()
        };

        TieredCache {
            inner: Arc::new(CacheInner {
                config,
                fetcher,
                ephemeral: MokaCache::builder().build(),
                durable,
                in_flight: Mutex::new(HashMap::new()),
                subscribers: SubscriberRegistry::new(),
            }),
        }
    }

    /// Return the payload for a path, fetching it when no fresh
    /// ephemeral entry exists.
    ///
    /// `Ok(None)` means the remote source has no data at this path.
    /// `Err` is raised only when the fetch failed and no fallback data
    /// (stale ephemeral or fresh durable) was available.
    pub async fn get(&self, path: &str) -> Result<Option<V>, CacheError> {
        self.read(path, false).await
    }

    /// Like [`get`](Self::get), but bypasses the freshness check and
    /// always goes to the remote source (still coalescing with any
    /// fetch already in flight for the key).
    pub async fn refresh(&self, path: &str) -> Result<Option<V>, CacheError> {
        self.read(path, true).await
    }

    async fn read(&self, path: &str, force_refresh: bool) -> FetchResult<V> {
        let key = normalize_path(path);

        if !force_refresh {
            if let Some(entry) = self.inner.ephemeral.get(&key) {
                let now = now_ms();
                if entry.is_fresh(now, self.inner.config.freshness_window) {
                    debug!("ephemeral hit for '{}'", key);
                    return Ok(Some(entry.payload.clone()));
                }
                if self.inner.config.background_refresh_enabled {
                    // Serve the stale payload now; a coalesced refresh
                    // lands behind the caller's back.
                    self.inner.spawn_fetch_if_absent(&key);
                    debug!("serving stale entry for '{}', refreshing in background", key);
                    return Ok(Some(entry.payload.clone()));
                }
            }
        }

        let rx = self.inner.join_or_start_fetch(&key);
        self.inner.await_settled(rx, &key).await
    }

    /// Resolve many paths at once.
    ///
    /// Fresh ephemeral entries are taken without I/O; the remaining
    /// keys are fetched in parallel, each individually coalesced under
    /// the single-flight rule. The result map preserves every requested
    /// path, including those that resolved to `None`.
    pub async fn get_multiple(
        &self,
        paths: &[&str],
    ) -> Result<HashMap<String, Option<V>>, CacheError> {
        let mut results = HashMap::with_capacity(paths.len());
        let mut misses = Vec::new();
        let now = now_ms();

        for path in paths {
            let key = normalize_path(path);
            match self.inner.ephemeral.get(&key) {
                Some(entry) if entry.is_fresh(now, self.inner.config.freshness_window) => {
                    results.insert(path.to_string(), Some(entry.payload.clone()));
                }
                _ => misses.push(*path),
            }
        }

        let fetched = join_all(
            misses
                .into_iter()
                .map(|path| async move { (path.to_string(), self.read(path, false).await) }),
        )
        .await;

        for (path, outcome) in fetched {
            results.insert(path, outcome?);
        }

        Ok(results)
    }

    /// Warm the cache for a set of paths.
    ///
    /// Each path is fetched with normal `get` semantics; failures are
    /// independent, logged, and never surfaced. Returns once every
    /// attempt has settled.
    pub async fn preload(&self, paths: &[&str]) {
        let attempts = join_all(
            paths
                .iter()
                .copied()
                .map(|path| async move { (path, self.read(path, false).await) }),
        )
        .await;

        for (path, outcome) in attempts {
            if let Err(e) = outcome {
                warn!("preload for '{}' failed: {}", path, e);
            }
        }
    }

    /// Register a callback invoked with each newly fetched payload for
    /// a path.
    ///
    /// If the key already has an ephemeral value (fresh or stale) the
    /// callback is invoked with it immediately, so new subscribers are
    /// not left waiting for the next fetch to learn the current state.
    pub fn subscribe(
        &self,
        path: &str,
        callback: impl Fn(&V) + Send + Sync + 'static,
    ) -> Subscription {
        let key = normalize_path(path);
        let callback: SubscriberCallback<V> = Arc::new(callback);
        let subscription = self.inner.subscribers.add(&key, Arc::clone(&callback));

        if let Some(entry) = self.inner.ephemeral.get(&key) {
            callback(&entry.payload);
        }

        subscription
    }

    /// Drop the ephemeral entry for a path and, best-effort, its
    /// durable record. The next `get` (absent a durable hit) goes to
    /// the remote source. Subscribers are not notified; they only
    /// hear about new data, not absence.
    pub fn invalidate(&self, path: &str) {
        let key = normalize_path(path);
        self.inner.ephemeral.invalidate(&key);

        if self.inner.durable.is_enabled() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.durable.remove(&key).await;
            });
        }
    }

    /// Clear the whole ephemeral tier and, best-effort, the durable
    /// tier. Subscriptions are untouched and in-flight fetches are not
    /// cancelled; a fetch started before the call still completes,
    /// populates the cache and notifies subscribers.
    pub fn invalidate_all(&self) {
        self.inner.ephemeral.invalidate_all();

        if self.inner.durable.is_enabled() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.durable.clear_all().await;
            });
        }
    }

    /// Read-only counters for observability.
    pub fn stats(&self) -> CacheStats {
        self.inner.ephemeral.run_pending_tasks();
        CacheStats {
            ephemeral_entries: self.inner.ephemeral.entry_count(),
            in_flight_fetches: self.inner.in_flight.lock().unwrap().len(),
            subscriber_count: self.inner.subscribers.count(),
        }
    }
}

impl<V> CacheInner<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Join the in-flight fetch for `key`, or start one. The in-flight
    /// table holds at most one entry per key; everyone arriving while
    /// it exists shares the same settled outcome.
    fn join_or_start_fetch(
        self: &Arc<Self>,
        key: &str,
    ) -> watch::Receiver<Option<FetchResult<V>>> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(rx) = in_flight.get(key) {
            debug!("coalescing onto in-flight fetch for '{}'", key);
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(key.to_string(), rx.clone());
        drop(in_flight);

        // The fetch runs detached so it settles (and still populates
        // the cache and notifies subscribers) even if every waiting
        // caller goes away.
        let inner = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            let outcome = inner.fetch_with_fallback(&key).await;
            inner.in_flight.lock().unwrap().remove(&key);
            let _ = tx.send(Some(outcome));
        });

        rx
    }

    fn spawn_fetch_if_absent(self: &Arc<Self>, key: &str) {
        let _rx = self.join_or_start_fetch(key);
    }

    async fn await_settled(
        &self,
        mut rx: watch::Receiver<Option<FetchResult<V>>>,
        key: &str,
    ) -> FetchResult<V> {
        let settled = rx
            .wait_for(|state| state.is_some())
            .await
            .map(|state| state.as_ref().cloned());
        match settled {
            Ok(Some(outcome)) => outcome,
            Ok(None) => Err(CacheError::fetch(key, "fetch settled without an outcome")),
            Err(_) => {
                // The fetch task died without settling. Clear its table
                // entry (unless a newer fetch already replaced it) so
                // the next read starts fresh.
                let mut in_flight = self.in_flight.lock().unwrap();
                if in_flight
                    .get(key)
                    .is_some_and(|pending| pending.same_channel(&rx))
                {
                    in_flight.remove(key);
                }
                Err(CacheError::fetch(key, "fetch task terminated before settling"))
            }
        }
    }

    async fn fetch_with_fallback(self: &Arc<Self>, key: &str) -> FetchResult<V> {
        match self.fetcher.fetch(key).await {
            Ok(Some(payload)) => {
                self.commit(key, payload.clone());
                Ok(Some(payload))
            }
            Ok(None) => {
                debug!("remote source has no data at '{}'", key);
                Ok(None)
            }
            Err(error) => self.fall_back(key, error).await,
        }
    }

    /// Install a freshly fetched entry: ephemeral insert, detached
    /// durable write-through, subscriber notification.
    fn commit(self: &Arc<Self>, key: &str, payload: V) {
        let entry = Arc::new(CacheEntry::new(key, payload, now_ms()));
        self.ephemeral.insert(key.to_string(), Arc::clone(&entry));

        if self.durable.is_enabled() {
            let inner = Arc::clone(self);
            let entry = Arc::clone(&entry);
            tokio::spawn(async move {
                match DurableRecord::from_entry(&entry) {
                    Ok(record) => inner.durable.write(&entry.key, record).await,
                    Err(e) => warn!("skipping durable write for '{}': {}", entry.key, e),
                }
            });
        }

        self.subscribers.notify(key, &entry.payload);
    }

    /// The one fallback chance a failed fetch gets: a stale ephemeral
    /// entry first, then a fresh durable record (promoted into the
    /// ephemeral tier). Only when both are absent does the error
    /// surface.
    async fn fall_back(&self, key: &str, error: CacheError) -> FetchResult<V> {
        if let Some(entry) = self.ephemeral.get(key) {
            warn!("fetch for '{}' failed, serving stale entry: {}", key, error);
            return Ok(Some(entry.payload.clone()));
        }

        if let Some(record) = self.durable.read(key).await {
            match record.into_entry::<V>(key) {
                Ok(entry) => {
                    if entry.is_fresh(now_ms(), self.config.freshness_window) {
                        warn!("fetch for '{}' failed, serving durable record: {}", key, error);
                        let entry = Arc::new(entry);
                        self.ephemeral.insert(key.to_string(), Arc::clone(&entry));
                        return Ok(Some(entry.payload.clone()));
                    }
                    debug!("durable record for '{}' is stale, ignoring", key);
                }
                Err(e) => warn!("durable record for '{}' unusable: {}", key, e),
            }
        }

        Err(error)
    }
}
