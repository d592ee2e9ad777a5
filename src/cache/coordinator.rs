//! Cache Coordinator
//!
//! Typed facade over the [`SnapshotCache`] backend plus the observability
//! counters. Every method is best-effort: backend and codec failures are
//! logged at `warn` and reported as misses, never propagated — the store
//! remains the sole source of truth.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::metrics::{Counters, CACHE_HITS, CACHE_MISSES};
use crate::store::{Lot, User};

use super::{lot_key, user_key, SnapshotCache, LOTS_ALL_KEY};

/// Coordinates snapshot caching and counter bumps for the engine.
///
/// Injected into the Allocation Engine as an explicit dependency; the engine
/// calls `invalidate_*` strictly **after** a store-level commit succeeds, so
/// a racing read can never repopulate data older than the commit it lost to.
pub struct CacheCoordinator {
    cache: Arc<dyn SnapshotCache>,
    counters: Counters,
    entity_ttl: Duration,
    list_ttl: Duration,
    counter_expiry: Duration,
}

impl CacheCoordinator {
    /// Build a coordinator over the given backend
    pub fn new(cache: Arc<dyn SnapshotCache>, counters: Counters, config: &Config) -> Self {
        Self {
            cache,
            counters,
            entity_ttl: config.entity_cache_ttl,
            list_ttl: config.list_cache_ttl,
            counter_expiry: config.counter_expiry,
        }
    }

    /// The counter registry shared with the engine
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Expiry window for windowed (daily-tally style) counters
    pub fn counter_expiry(&self) -> Duration {
        self.counter_expiry
    }

    // =========================================================================
    // Typed Reads / Writes
    // =========================================================================

    /// Cached lot snapshot, if live
    pub fn get_lot(&self, id: u64) -> Option<Lot> {
        self.get_snapshot(&lot_key(id))
    }

    /// Cache a lot snapshot under the entity TTL
    pub fn put_lot(&self, lot: &Lot) {
        self.put_snapshot(&lot_key(lot.id), lot, self.entity_ttl);
    }

    /// Cached full lot list, if live
    pub fn get_lots(&self) -> Option<Vec<Lot>> {
        self.get_snapshot(LOTS_ALL_KEY)
    }

    /// Cache the full lot list under the list TTL
    pub fn put_lots(&self, lots: &[Lot]) {
        self.put_snapshot(LOTS_ALL_KEY, &lots.to_vec(), self.list_ttl);
    }

    /// Cached user projection, if live
    pub fn get_user(&self, id: u64) -> Option<User> {
        self.get_snapshot(&user_key(id))
    }

    /// Cache a user projection under the entity TTL
    pub fn put_user(&self, user: &User) {
        self.put_snapshot(&user_key(user.id), user, self.entity_ttl);
    }

    // =========================================================================
    // Invalidation Hooks (post-commit only)
    // =========================================================================

    /// Drop a lot's entity key and the aggregate list key
    pub fn invalidate_lot(&self, id: u64) {
        self.invalidate(&lot_key(id));
        self.invalidate(LOTS_ALL_KEY);
    }

    /// Drop only the aggregate lot list key
    pub fn invalidate_lot_list(&self) {
        self.invalidate(LOTS_ALL_KEY);
    }

    /// Drop a user's projection key
    pub fn invalidate_user(&self, id: u64) {
        self.invalidate(&user_key(id));
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn get_snapshot<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.cache.get(key) {
            Ok(Some(b)) => b,
            Ok(None) => {
                self.counters.incr(CACHE_MISSES);
                return None;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed; treating as miss");
                self.counters.incr(CACHE_MISSES);
                return None;
            }
        };

        match bincode::deserialize(&bytes) {
            Ok(value) => {
                self.counters.incr(CACHE_HITS);
                Some(value)
            }
            Err(e) => {
                // A snapshot we cannot decode is as good as absent; drop it
                // so it cannot shadow fresh data for the rest of its TTL
                tracing::warn!(key, error = %e, "cache snapshot undecodable; evicting");
                self.invalidate(key);
                self.counters.incr(CACHE_MISSES);
                None
            }
        }
    }

    fn put_snapshot<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match bincode::serialize(value) {
            Ok(b) => Bytes::from(b),
            Err(e) => {
                tracing::warn!(key, error = %e, "cache snapshot encode failed; skipping");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, bytes, ttl) {
            tracing::warn!(key, error = %e, "cache write failed; skipping");
        }
    }

    fn invalidate(&self, key: &str) {
        if let Err(e) = self.cache.invalidate(key) {
            tracing::warn!(key, error = %e, "cache invalidation failed");
        }
    }
}
