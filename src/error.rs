/// Error type surfaced by cache reads.
///
/// A remote `NotFound` is not an error; it is modeled as `Ok(None)`.
/// Durable-tier failures are absorbed internally (see
/// [`DurableError`](crate::durable::DurableError)) and never reach this
/// type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The remote source failed and no fallback data (fresh, stale, or
    /// durable) was available. The only error `get`/`get_multiple`
    /// surface.
    #[error("fetch failed for key '{key}': {message}")]
    Fetch { key: String, message: String },

    /// A progressive loader was asked to load a second time. Create a
    /// new loader per load cycle.
    #[error("progressive load already started; create a new loader per load cycle")]
    LoadAlreadyStarted,
}

impl CacheError {
    /// Create a new fetch error.
    pub fn fetch(key: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::Fetch {
            key: key.into(),
            message: message.into(),
        }
    }
}
