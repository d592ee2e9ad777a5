//! Configuration for Lotkeeper
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

/// Main configuration for a Lotkeeper instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// TTL for individual-entity cache keys (`lot:{id}`, `user:{id}`).
    ///
    /// Deliberately short: availability data changes frequently, so the TTL
    /// bounds staleness rather than maximizing hit rate.
    pub entity_cache_ttl: Duration,

    /// TTL for aggregate cache keys (`lots:all`)
    pub list_cache_ttl: Duration,

    // -------------------------------------------------------------------------
    // Metrics Configuration
    // -------------------------------------------------------------------------
    /// Expiry window applied to windowed counters (daily-style tallies)
    pub counter_expiry: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entity_cache_ttl: Duration::from_secs(10),
            list_cache_ttl: Duration::from_secs(10),
            counter_expiry: Duration::from_secs(3600),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TTL for individual-entity cache keys
    pub fn entity_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.entity_cache_ttl = ttl;
        self
    }

    /// Set the TTL for aggregate cache keys
    pub fn list_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.list_cache_ttl = ttl;
        self
    }

    /// Set the expiry window for windowed counters
    pub fn counter_expiry(mut self, window: Duration) -> Self {
        self.config.counter_expiry = window;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
