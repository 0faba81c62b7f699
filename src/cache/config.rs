//! Cache configuration.
//!
//! Built from the validated `[cache]` section of the settings.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_CAPACITY: usize = 10_000;
const DEFAULT_FEED_TTL: Duration = Duration::from_secs(300);
const DEFAULT_FEED_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Enable the read cache. When disabled every read goes to the store.
    pub enabled: bool,
    /// Maximum number of entries held in memory.
    pub capacity: NonZeroUsize,
    /// Time-to-live of an assembled feed page.
    pub feed_ttl: Duration,
    /// Number of posts assembled and cached for the first feed page.
    pub feed_page_size: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            feed_ttl: DEFAULT_FEED_TTL,
            feed_page_size: NonZeroUsize::new(DEFAULT_FEED_PAGE_SIZE).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            capacity: settings.capacity,
            feed_ttl: settings.feed_ttl,
            feed_page_size: settings.feed_page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.capacity.get(), 10_000);
        assert_eq!(config.feed_ttl, Duration::from_secs(300));
        assert_eq!(config.feed_page_size.get(), 50);
    }
}
