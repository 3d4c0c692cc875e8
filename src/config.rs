use std::time::Duration;

/// Process-wide cache configuration, set once at construction.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age an entry may have before it is considered stale and
    /// eligible for refetch.
    pub freshness_window: Duration,

    /// Mirror successful fetches into the durable tier and consult it
    /// when the remote source fails. Ignored when no durable store is
    /// configured.
    pub durable_tier_enabled: bool,

    /// Serve stale ephemeral entries immediately and refresh them with
    /// a coalesced background fetch, instead of refetching inline.
    pub background_refresh_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            freshness_window: Duration::from_secs(300),
            durable_tier_enabled: true,
            background_refresh_enabled: false,
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the freshness window.
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Enable or disable the durable tier.
    pub fn with_durable_tier(mut self, enabled: bool) -> Self {
        self.durable_tier_enabled = enabled;
        self
    }

    /// Enable or disable background refresh of stale entries.
    pub fn with_background_refresh(mut self, enabled: bool) -> Self {
        self.background_refresh_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.freshness_window, Duration::from_secs(300));
        assert!(config.durable_tier_enabled);
        assert!(!config.background_refresh_enabled);
    }

    #[test]
    fn test_builder_chain() {
        let config = CacheConfig::new()
            .with_freshness_window(Duration::from_millis(250))
            .with_durable_tier(false)
            .with_background_refresh(true);

        assert_eq!(config.freshness_window, Duration::from_millis(250));
        assert!(!config.durable_tier_enabled);
        assert!(config.background_refresh_enabled);
    }
}
