//! Progressive "critical-then-background" loading on top of the cache.
//!
//! A screen typically needs a small set of keys before it can render
//! and a larger set it can fill in afterwards. The loader resolves the
//! critical set first and hands it to the caller, then resolves the
//! background set on a detached task. The caller is never blocked by
//! the slower, less important data.

use futures::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::warn;

use crate::cache::TieredCache;
use crate::error::CacheError;

/// Phases of a progressive load.
///
/// The only valid progression is `Idle → LoadingCritical →
/// CriticalReady → LoadingBackground → BackgroundReady`. There is no
/// cancellation and no re-entry; create a new loader per load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    LoadingCritical,
    CriticalReady,
    LoadingBackground,
    BackgroundReady,
}

struct LoaderState<V> {
    started: AtomicBool,
    phase: watch::Sender<LoadPhase>,
    critical: Mutex<HashMap<String, Option<V>>>,
    background: Mutex<HashMap<String, Option<V>>>,
}

/// Two-phase loader over a [`TieredCache`].
///
/// One instance drives one load cycle. Results accumulate in the
/// loader and can be inspected at any time; `load` additionally
/// returns the critical results directly.
pub struct ProgressiveLoader<V>
where
    V: Clone + Send + Sync,
{
    cache: TieredCache<V>,
    critical_paths: Vec<String>,
    background_paths: Vec<String>,
    state: Arc<LoaderState<V>>,
}

impl<V> ProgressiveLoader<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Create a loader for the given key sets.
    pub fn new(cache: TieredCache<V>, critical: &[&str], background: &[&str]) -> Self {
        let (phase, _) = watch::channel(LoadPhase::Idle);
        ProgressiveLoader {
            cache,
            critical_paths: critical.iter().map(|p| p.to_string()).collect(),
            background_paths: background.iter().map(|p| p.to_string()).collect(),
            state: Arc::new(LoaderState {
                started: AtomicBool::new(false),
                phase,
                critical: Mutex::new(HashMap::new()),
                background: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run the load cycle.
    ///
    /// Resolves the critical keys, returns their results, and kicks
    /// off the background batch on a detached task. A key that
    /// resolves to `None` or fails is recorded as `None`; neither
    /// fails the phase (failures are logged).
    pub async fn load(&self) -> Result<HashMap<String, Option<V>>, CacheError> {
        if self.state.started.swap(true, Ordering::SeqCst) {
            return Err(CacheError::LoadAlreadyStarted);
        }

        let _ = self.state.phase.send(LoadPhase::LoadingCritical);
        let critical = settle_batch(&self.cache, &self.critical_paths).await;
        *self.state.critical.lock().unwrap() = critical.clone();
        let _ = self.state.phase.send(LoadPhase::CriticalReady);

        // Background batch starts unconditionally, without blocking
        // the caller who already has the critical results.
        let cache = self.cache.clone();
        let state = Arc::clone(&self.state);
        let background_paths = self.background_paths.clone();
        tokio::spawn(async move {
            let _ = state.phase.send(LoadPhase::LoadingBackground);
            let background = settle_batch(&cache, &background_paths).await;
            *state.background.lock().unwrap() = background;
            let _ = state.phase.send(LoadPhase::BackgroundReady);
        });

        Ok(critical)
    }

    /// Current phase.
    pub fn phase(&self) -> LoadPhase {
        *self.state.phase.borrow()
    }

    /// Snapshot of the critical results gathered so far.
    pub fn critical_results(&self) -> HashMap<String, Option<V>> {
        self.state.critical.lock().unwrap().clone()
    }

    /// Snapshot of the background results gathered so far.
    pub fn background_results(&self) -> HashMap<String, Option<V>> {
        self.state.background.lock().unwrap().clone()
    }

    /// Wait until the background batch has settled.
    pub async fn wait_background_ready(&self) {
        let mut rx = self.state.phase.subscribe();
        let _ = rx
            .wait_for(|phase| *phase == LoadPhase::BackgroundReady)
            .await;
    }
}

/// Resolve every path, recording hard failures as `None` so the batch
/// always settles.
async fn settle_batch<V>(
    cache: &TieredCache<V>,
    paths: &[String],
) -> HashMap<String, Option<V>>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    let resolved = join_all(
        paths
            .iter()
            .map(|path| async move { (path.clone(), cache.get(path).await) }),
    )
    .await;

    let mut results = HashMap::with_capacity(resolved.len());
    for (path, outcome) in resolved {
        match outcome {
            Ok(value) => {
                results.insert(path, value);
            }
            Err(e) => {
                warn!("progressive load for '{}' failed: {}", path, e);
                results.insert(path, None);
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::fetcher::RemoteFetcher;
    use std::time::Duration;

    /// Critical keys resolve in ~10ms, background keys in ~150ms.
    fn staged_fetcher() -> Arc<dyn RemoteFetcher<String>> {
        Arc::new(|path: String| async move {
            if path.starts_with("bg/") {
                tokio::time::sleep(Duration::from_millis(150)).await;
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(Some(format!("data:{}", path)))
        })
    }

    fn test_cache(fetcher: Arc<dyn RemoteFetcher<String>>) -> TieredCache<String> {
        TieredCache::new(fetcher, CacheConfig::new().with_durable_tier(false))
    }

    #[tokio::test]
    async fn test_loader_starts_idle() {
        let loader = ProgressiveLoader::new(test_cache(staged_fetcher()), &["a"], &["bg/c"]);
        assert_eq!(loader.phase(), LoadPhase::Idle);
        assert!(loader.critical_results().is_empty());
    }

    #[tokio::test]
    async fn test_critical_ready_strictly_before_background_ready() {
        let loader = ProgressiveLoader::new(
            test_cache(staged_fetcher()),
            &["a", "b"],
            &["bg/c", "bg/d"],
        );

        let critical = loader.load().await.unwrap();

        // The caller has the critical data while the background batch
        // is still running.
        assert_eq!(critical["a"], Some("data:a".to_string()));
        assert_eq!(critical["b"], Some("data:b".to_string()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(loader.phase(), LoadPhase::LoadingBackground);
        assert!(loader.background_results().is_empty());

        loader.wait_background_ready().await;
        assert_eq!(loader.phase(), LoadPhase::BackgroundReady);
        let background = loader.background_results();
        assert_eq!(background["bg/c"], Some("data:bg/c".to_string()));
        assert_eq!(background["bg/d"], Some("data:bg/d".to_string()));
    }

    #[tokio::test]
    async fn test_second_load_is_rejected() {
        let loader = ProgressiveLoader::new(test_cache(staged_fetcher()), &["a"], &[]);

        loader.load().await.unwrap();
        assert!(matches!(
            loader.load().await,
            Err(CacheError::LoadAlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_a_phase_failure() {
        let fetcher: Arc<dyn RemoteFetcher<String>> = Arc::new(|path: String| async move {
            if path == "absent" {
                Ok(None)
            } else {
                Ok(Some(path))
            }
        });
        let loader = ProgressiveLoader::new(test_cache(fetcher), &["present", "absent"], &[]);

        let critical = loader.load().await.unwrap();
        assert_eq!(critical["present"], Some("present".to_string()));
        assert_eq!(critical["absent"], None);

        loader.wait_background_ready().await;
        assert_eq!(loader.phase(), LoadPhase::BackgroundReady);
    }

    #[tokio::test]
    async fn test_failed_key_recorded_as_none() {
        let fetcher: Arc<dyn RemoteFetcher<String>> = Arc::new(|path: String| async move {
            if path == "broken" {
                Err(CacheError::fetch(path, "remote unreachable"))
            } else {
                Ok(Some(path))
            }
        });
        let loader = ProgressiveLoader::new(test_cache(fetcher), &["ok", "broken"], &[]);

        let critical = loader.load().await.unwrap();
        assert_eq!(critical["ok"], Some("ok".to_string()));
        assert_eq!(critical["broken"], None);
    }
}
