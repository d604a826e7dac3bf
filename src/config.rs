//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default number of entries kept in the memory tier
pub const DEFAULT_MAX_MEMORY_COUNT: usize = 100;
/// Default disk quota in bytes
pub const DEFAULT_MAX_DISK_SIZE: u64 = 100_000_000;
/// Default entry TTL in seconds
pub const DEFAULT_TTL_SECS: u64 = 3600;
/// Default maintenance interval in seconds
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
/// Default application identifier used to namespace cache directories
pub const DEFAULT_APP_ID: &str = "tiered_cache";

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache name, used as the disk directory suffix
    pub name: String,
    /// Maximum number of entries held in memory
    pub max_memory_count: usize,
    /// Maximum bytes on disk before oldest-first eviction
    pub max_disk_size: u64,
    /// TTL applied when the caller does not pass one
    pub default_ttl: Duration,
    /// Interval between background maintenance passes
    pub cleanup_interval: Duration,
    /// Whether a disk tier is constructed at all
    pub enable_disk_tier: bool,
    /// Whether misses feed the prefetch hook
    pub enable_predictive_loading: bool,
    /// Whether per-key access patterns are tracked
    pub enable_analytics: bool,
    /// Application identifier namespacing the cache directory
    pub app_id: String,
    /// Root directory holding cache directories; platform cache dir if None
    pub cache_root: Option<PathBuf>,
}

impl CacheConfig {
    /// Creates a config with the given name and default values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - Cache name (default: "default")
    /// - `CACHE_MAX_MEMORY_COUNT` - Memory tier entry limit (default: 100)
    /// - `CACHE_MAX_DISK_SIZE` - Disk quota in bytes (default: 100000000)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `CACHE_CLEANUP_INTERVAL` - Maintenance frequency in seconds (default: 300)
    /// - `CACHE_ENABLE_DISK` - Enable the disk tier (default: true)
    /// - `CACHE_ENABLE_PREDICTIVE` - Enable the prefetch hook (default: true)
    /// - `CACHE_ENABLE_ANALYTICS` - Enable access tracking (default: true)
    /// - `CACHE_APP_ID` - Application identifier (default: "tiered_cache")
    /// - `CACHE_ROOT` - Cache root directory (default: platform cache dir)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: env::var("CACHE_NAME").unwrap_or(defaults.name),
            max_memory_count: parse_env("CACHE_MAX_MEMORY_COUNT")
                .unwrap_or(defaults.max_memory_count),
            max_disk_size: parse_env("CACHE_MAX_DISK_SIZE").unwrap_or(defaults.max_disk_size),
            default_ttl: parse_env("CACHE_DEFAULT_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            cleanup_interval: parse_env("CACHE_CLEANUP_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            enable_disk_tier: parse_env("CACHE_ENABLE_DISK").unwrap_or(defaults.enable_disk_tier),
            enable_predictive_loading: parse_env("CACHE_ENABLE_PREDICTIVE")
                .unwrap_or(defaults.enable_predictive_loading),
            enable_analytics: parse_env("CACHE_ENABLE_ANALYTICS")
                .unwrap_or(defaults.enable_analytics),
            app_id: env::var("CACHE_APP_ID").unwrap_or(defaults.app_id),
            cache_root: env::var("CACHE_ROOT").ok().map(PathBuf::from),
        }
    }

    pub fn with_max_memory_count(mut self, count: usize) -> Self {
        self.max_memory_count = count;
        self
    }

    pub fn with_max_disk_size(mut self, bytes: u64) -> Self {
        self.max_disk_size = bytes;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_disk_tier(mut self, enabled: bool) -> Self {
        self.enable_disk_tier = enabled;
        self
    }

    pub fn with_predictive_loading(mut self, enabled: bool) -> Self {
        self.enable_predictive_loading = enabled;
        self
    }

    pub fn with_analytics(mut self, enabled: bool) -> Self {
        self.enable_analytics = enabled;
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    // == Validate ==
    /// Rejects values that would make the cache unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_count == 0 {
            return Err(CacheError::InvalidConfig(
                "max_memory_count must be at least 1".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "default_ttl must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves the root directory that holds per-cache directories.
    pub fn resolved_root(&self) -> PathBuf {
        self.cache_root.clone().unwrap_or_else(|| {
            dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"))
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_memory_count: DEFAULT_MAX_MEMORY_COUNT,
            max_disk_size: DEFAULT_MAX_DISK_SIZE,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            enable_disk_tier: true,
            enable_predictive_loading: true,
            enable_analytics: true,
            app_id: DEFAULT_APP_ID.to_string(),
            cache_root: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &str) -> Option<T> {
    env::var(var).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.name, "default");
        assert_eq!(config.max_memory_count, 100);
        assert_eq!(config.max_disk_size, 100_000_000);
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.cleanup_interval, Duration::from_secs(300));
        assert!(config.enable_disk_tier);
        assert!(config.enable_predictive_loading);
        assert!(config.enable_analytics);
        assert!(config.cache_root.is_none());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for var in [
            "CACHE_NAME",
            "CACHE_MAX_MEMORY_COUNT",
            "CACHE_MAX_DISK_SIZE",
            "CACHE_DEFAULT_TTL",
            "CACHE_CLEANUP_INTERVAL",
            "CACHE_ENABLE_DISK",
            "CACHE_ENABLE_PREDICTIVE",
            "CACHE_ENABLE_ANALYTICS",
            "CACHE_APP_ID",
            "CACHE_ROOT",
        ] {
            env::remove_var(var);
        }

        let config = CacheConfig::from_env();
        assert_eq!(config.name, "default");
        assert_eq!(config.max_memory_count, 100);
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.app_id, DEFAULT_APP_ID);
    }

    #[test]
    fn test_builder_setters() {
        let config = CacheConfig::new("rates")
            .with_max_memory_count(2)
            .with_default_ttl(Duration::from_secs(5))
            .with_disk_tier(false)
            .with_cache_root("/tmp/x");

        assert_eq!(config.name, "rates");
        assert_eq!(config.max_memory_count, 2);
        assert_eq!(config.default_ttl, Duration::from_secs(5));
        assert!(!config.enable_disk_tier);
        assert_eq!(config.resolved_root(), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(CacheConfig::default().validate().is_ok());
        assert!(matches!(
            CacheConfig::default().with_max_memory_count(0).validate(),
            Err(CacheError::InvalidConfig(_))
        ));
        assert!(matches!(
            CacheConfig::default()
                .with_default_ttl(Duration::ZERO)
                .validate(),
            Err(CacheError::InvalidConfig(_))
        ));
        assert!(matches!(
            CacheConfig::default()
                .with_cleanup_interval(Duration::ZERO)
                .validate(),
            Err(CacheError::InvalidConfig(_))
        ));
    }
}
