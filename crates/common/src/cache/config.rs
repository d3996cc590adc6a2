//! Cache configuration types and builder patterns

use std::time::Duration;

/// Configuration for the in-memory cache tier
///
/// Eviction is always least-recently-used once `max_size` is reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries (None = unlimited)
    pub max_size: Option<usize>,

    /// Default time-to-live for entries inserted without an explicit TTL
    /// (None = no expiration)
    pub ttl: Option<Duration>,

    /// Soft byte budget reported in stats; never enforced
    pub max_bytes: Option<usize>,
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Unbounded cache whose entries expire after `duration`
    pub fn ttl(duration: Duration) -> Self {
        Self { ttl: Some(duration), ..Self::default() }
    }

    /// Bounded LRU cache without expiry
    pub fn lru(max_size: usize) -> Self {
        Self { max_size: Some(max_size), ..Self::default() }
    }

    /// Bounded LRU cache whose entries expire after `ttl`
    pub fn ttl_lru(ttl: Duration, max_size: usize) -> Self {
        Self { max_size: Some(max_size), ttl: Some(ttl), max_bytes: None }
    }
}

/// Builder for CacheConfig with fluent API
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Set maximum number of entries
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = Some(size);
        self
    }

    /// Set the default time-to-live for entries
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.config.ttl = Some(duration);
        self
    }

    /// Set the soft byte budget reported in stats
    pub fn max_bytes(mut self, bytes: usize) -> Self {
        self.config.max_bytes = Some(bytes);
        self
    }

    /// Build the configuration
    pub fn build(self) -> CacheConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates the preset constructors.
    ///
    /// Assertions:
    /// - Confirms `ttl_lru` sets both bounds.
    /// - Confirms `lru` leaves TTL unset.
    #[test]
    fn test_cache_config_presets() {
        let config = CacheConfig::ttl_lru(Duration::from_secs(60), 10);
        assert_eq!(config.max_size, Some(10));
        assert_eq!(config.ttl, Some(Duration::from_secs(60)));

        let config = CacheConfig::lru(5);
        assert_eq!(config.max_size, Some(5));
        assert!(config.ttl.is_none());
    }

    /// Validates `CacheConfig::builder` for the full builder scenario.
    ///
    /// Assertions:
    /// - Confirms every builder setter lands in the built config.
    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::builder()
            .max_size(100)
            .ttl(Duration::from_secs(3600))
            .max_bytes(50 * 1024 * 1024)
            .build();

        assert_eq!(config.max_size, Some(100));
        assert_eq!(config.ttl, Some(Duration::from_secs(3600)));
        assert_eq!(config.max_bytes, Some(50 * 1024 * 1024));
    }
}
