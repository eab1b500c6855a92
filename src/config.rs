//! Cache configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::data::ergast::{DEFAULT_BASE_URL, DEFAULT_PAGE_LIMIT, DEFAULT_TIMEOUT_SECS};

/// Settings shared by every component of the cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Stored records younger than this are served without a network call
    pub freshness_hours: f64,
    /// How long a payload stays in the in-process memory cache
    pub memory_ttl: Duration,
    /// Upstream request timeout
    pub fetch_timeout: Duration,
    /// Root of the upstream API
    pub base_url: String,
    /// Rows requested per upstream page
    pub page_limit: u32,
    /// Interval between sweeps of expired memory entries; zero disables sweeping
    pub sweep_interval: Duration,
    /// Directory for the file store; `None` uses the XDG cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_hours: 24.0,
            memory_ttl: Duration::from_secs(300), // 5 minutes
            fetch_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            sweep_interval: Duration::from_secs(60),
            cache_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.freshness_hours, 24.0);
        assert_eq!(config.memory_ttl, Duration::from_secs(300));
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.page_limit, 100);
        assert!(config.base_url.starts_with("https://"));
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_cache_config_custom() {
        let config = CacheConfig {
            freshness_hours: 2.0,
            cache_dir: Some(PathBuf::from("/tmp/paddock")),
            ..Default::default()
        };
        assert_eq!(config.freshness_hours, 2.0);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/paddock")));
        assert_eq!(config.memory_ttl, Duration::from_secs(300));
    }
}
