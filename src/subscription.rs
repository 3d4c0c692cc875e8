//! Per-key subscriber registry.
//!
//! Subscribers hear about every successful fetch for their key. The
//! registry owns nothing about replay; the cache core replays the
//! current value when it registers a callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A subscriber callback, invoked with each newly fetched payload.
pub type SubscriberCallback<V> = Arc<dyn Fn(&V) + Send + Sync>;

struct RegistryInner<V> {
    sets: Mutex<HashMap<String, HashMap<u64, SubscriberCallback<V>>>>,
    next_id: AtomicU64,
}

/// Mapping from cache key to its set of subscriber callbacks.
pub(crate) struct SubscriberRegistry<V> {
    inner: Arc<RegistryInner<V>>,
}

impl<V> SubscriberRegistry<V>
where
    V: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        SubscriberRegistry {
            inner: Arc::new(RegistryInner {
                sets: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a callback for a key and return its unsubscribe handle.
    pub(crate) fn add(&self, key: &str, callback: SubscriberCallback<V>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut sets = self.inner.sets.lock().unwrap();
            sets.entry(key.to_string()).or_default().insert(id, callback);
        }

        let registry: Weak<RegistryInner<V>> = Arc::downgrade(&self.inner);
        let key = key.to_string();
        Subscription {
            cancel: Arc::new(move || {
                if let Some(inner) = registry.upgrade() {
                    let mut sets = inner.sets.lock().unwrap();
                    if let Some(set) = sets.get_mut(&key) {
                        set.remove(&id);
                        if set.is_empty() {
                            sets.remove(&key);
                        }
                    }
                }
            }),
        }
    }

    /// Invoke every callback registered for a key.
    ///
    /// Callbacks are snapshotted out of the lock first, so a callback
    /// may subscribe or unsubscribe without deadlocking.
    pub(crate) fn notify(&self, key: &str, payload: &V) {
        let callbacks: Vec<SubscriberCallback<V>> = {
            let sets = self.inner.sets.lock().unwrap();
            match sets.get(key) {
                Some(set) => set.values().cloned().collect(),
                None => return,
            }
        };

        for callback in callbacks {
            callback(payload);
        }
    }

    /// Total number of registered callbacks across all keys.
    pub(crate) fn count(&self) -> usize {
        self.inner.sets.lock().unwrap().values().map(HashMap::len).sum()
    }

    /// Number of keys with at least one subscriber.
    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.inner.sets.lock().unwrap().len()
    }
}

impl<V> Clone for SubscriberRegistry<V> {
    fn clone(&self) -> Self {
        SubscriberRegistry {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle returned by `subscribe`.
///
/// Calling [`unsubscribe`](Subscription::unsubscribe) removes exactly
/// the callback this handle was created for; calling it again is a
/// no-op. Dropping the handle without unsubscribing leaves the
/// callback registered: subscription lifetime is caller-controlled.
pub struct Subscription {
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// Remove the callback this handle refers to. Idempotent.
    pub fn unsubscribe(&self) {
        (self.cancel)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback(counter: Arc<AtomicUsize>) -> SubscriberCallback<String> {
        Arc::new(move |_payload| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_notify_reaches_all_subscribers_for_key() {
        let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));

        let _sub_a = registry.add("k", counting_callback(count_a.clone()));
        let _sub_b = registry.add("k", counting_callback(count_b.clone()));
        let _sub_other = registry.add("other", counting_callback(Arc::new(AtomicUsize::new(0))));

        registry.notify("k", &"payload".to_string());

        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn test_notify_without_subscribers_is_a_noop() {
        let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
        registry.notify("nobody", &"payload".to_string());
    }

    #[test]
    fn test_unsubscribe_removes_only_its_callback() {
        let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));

        let sub_a = registry.add("k", counting_callback(count_a.clone()));
        let _sub_b = registry.add("k", counting_callback(count_b.clone()));

        sub_a.unsubscribe();
        registry.notify("k", &"payload".to_string());

        assert_eq!(count_a.load(Ordering::SeqCst), 0);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
        let sub = registry.add("k", Arc::new(|_| {}));

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_last_unsubscribe_drops_key_set() {
        let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
        let sub_a = registry.add("k", Arc::new(|_| {}));
        let sub_b = registry.add("k", Arc::new(|_| {}));
        assert_eq!(registry.key_count(), 1);

        sub_a.unsubscribe();
        assert_eq!(registry.key_count(), 1);

        sub_b.unsubscribe();
        assert_eq!(registry.key_count(), 0);
    }

    #[test]
    fn test_dropping_handle_keeps_subscription() {
        let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let sub = registry.add("k", counting_callback(count.clone()));
        drop(sub);

        registry.notify("k", &"payload".to_string());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
