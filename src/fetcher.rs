use async_trait::async_trait;
use std::future::Future;

use crate::error::CacheError;

/// The authoritative remote source for cached resources.
///
/// Implementations perform the actual read against the remote document
/// store for a normalized path. The cache core calls this only on a
/// miss or a forced refresh; concurrent demand for the same key is
/// coalesced into a single invocation.
///
/// Return values:
/// - `Ok(Some(payload))`: the resource exists.
/// - `Ok(None)`: the remote source has no data at this path. This is
///   a valid result, not an error, and is surfaced to callers as a
///   `None` payload.
/// - `Err(_)`: the source was unreachable or failed; the cache core
///   gives the read one fallback chance (stale ephemeral, then durable)
///   before surfacing the error.
#[async_trait]
pub trait RemoteFetcher<V>: Send + Sync {
    /// Fetch the payload for a normalized path.
    async fn fetch(&self, path: &str) -> Result<Option<V>, CacheError>;
}

/// Any `Fn(String) -> Future` closure is a fetcher, so callers can wire
/// the cache to their data source without a named type.
///
/// # Example
/// ```ignore
/// let fetcher = Arc::new(|path: String| async move {
///     api_client.read_document(&path).await
/// });
/// let cache: TieredCache<Employee> = CacheBuilder::new(fetcher).build();
/// ```
#[async_trait]
impl<V, F, Fut> RemoteFetcher<V> for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<V>, CacheError>> + Send + 'static,
{
    async fn fetch(&self, path: &str) -> Result<Option<V>, CacheError> {
        (self)(path.to_string()).await
    }
}
