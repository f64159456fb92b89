//! Configuration Module
//!
//! Cache construction parameters, with defaults and environment loading.

use std::env;
use std::time::Duration;

use serde::Deserialize;

/// Capacity used when `max_size` is left at zero (64 MiB).
pub const DEFAULT_MAX_SIZE: usize = 64 * 1024 * 1024;

/// Cache configuration parameters.
///
/// A zero `max_size` falls back to [`DEFAULT_MAX_SIZE`]. A zero
/// `default_expire` means entries never expire unless stored with a TTL, and
/// a zero `clean_interval` disables the background reaper entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum total size of stored values, in bytes
    pub max_size: usize,
    /// TTL applied to entries stored without an explicit one
    pub default_expire: Duration,
    /// Period of the background expiry sweep
    pub clean_interval: Duration,
}

impl Config {
    /// Creates a configuration with all options at their defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity in bytes.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the TTL used when `store` is called without one.
    pub fn with_default_expire(mut self, default_expire: Duration) -> Self {
        self.default_expire = default_expire;
        self
    }

    /// Sets the reaper period.
    pub fn with_clean_interval(mut self, clean_interval: Duration) -> Self {
        self.clean_interval = clean_interval;
        self
    }

    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE` - Capacity in bytes (default: 64 MiB)
    /// - `CACHE_DEFAULT_EXPIRE_MS` - Default TTL in milliseconds (default: 0, never)
    /// - `CACHE_CLEAN_INTERVAL_MS` - Reaper period in milliseconds (default: 0, disabled)
    pub fn from_env() -> Self {
        Self {
            max_size: env::var("CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            default_expire: env::var("CACHE_DEFAULT_EXPIRE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or_default(),
            clean_interval: env::var("CACHE_CLEAN_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or_default(),
        }
    }

    /// Capacity after applying the zero-means-default rule.
    pub fn effective_max_size(&self) -> usize {
        if self.max_size == 0 {
            DEFAULT_MAX_SIZE
        } else {
            self.max_size
        }
    }

    /// Default TTL, or `None` when entries never expire by default.
    pub fn default_ttl(&self) -> Option<Duration> {
        (!self.default_expire.is_zero()).then_some(self.default_expire)
    }

    /// Reaper period, or `None` when the reaper is disabled.
    pub fn reaper_interval(&self) -> Option<Duration> {
        (!self.clean_interval.is_zero()).then_some(self.clean_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.effective_max_size(), DEFAULT_MAX_SIZE);
        assert_eq!(config.default_ttl(), None);
        assert_eq!(config.reaper_interval(), None);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_max_size(100)
            .with_default_expire(Duration::from_secs(5))
            .with_clean_interval(Duration::from_millis(250));

        assert_eq!(config.effective_max_size(), 100);
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(5)));
        assert_eq!(config.reaper_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("CACHE_MAX_SIZE", "4096");
        env::set_var("CACHE_DEFAULT_EXPIRE_MS", "1500");
        env::set_var("CACHE_CLEAN_INTERVAL_MS", "not-a-number");

        let config = Config::from_env();
        assert_eq!(config.max_size, 4096);
        assert_eq!(config.default_expire, Duration::from_millis(1500));
        assert_eq!(config.clean_interval, Duration::ZERO);

        env::remove_var("CACHE_MAX_SIZE");
        env::remove_var("CACHE_DEFAULT_EXPIRE_MS");
        env::remove_var("CACHE_CLEAN_INTERVAL_MS");
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: Config = serde_json::from_str(r#"{"max_size": 2048}"#).unwrap();
        assert_eq!(config.max_size, 2048);
        assert_eq!(config.default_ttl(), None);

        let config: Config =
            serde_json::from_str(r#"{"clean_interval": {"secs": 1, "nanos": 0}}"#).unwrap();
        assert_eq!(config.reaper_interval(), Some(Duration::from_secs(1)));
        assert_eq!(config.effective_max_size(), DEFAULT_MAX_SIZE);
    }
}
