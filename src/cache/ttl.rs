//! In-memory TTL cache
//!
//! HashMap behind a parking_lot RwLock. Entries expire at read time; a
//! periodic sweep is unnecessary at this scale but `purge_expired` exists
//! for long-running processes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;

use super::{CacheError, SnapshotCache};

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-local cache with per-entry TTLs.
///
/// Created on read-miss, destroyed on explicit invalidation or natural TTL
/// expiry — whichever comes first. Never authoritative.
#[derive(Default)]
pub struct TtlCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl TtlCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if no entries are stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry whose TTL has elapsed; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }
}

impl SnapshotCache for TtlCache {
    fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();

        // Fast path: shared lock, live entry
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(e) if !e.is_expired(now) => return Ok(Some(e.value.clone())),
                Some(_) => {} // expired, evict below
            }
        }

        // Evict the expired entry; re-check under the write lock in case a
        // concurrent set replaced it in between
        let mut entries = self.entries.write();
        if let Some(e) = entries.get(key) {
            if !e.is_expired(now) {
                return Ok(Some(e.value.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn set_then_get_roundtrips() {
        let cache = TtlCache::new();
        cache
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(Bytes::from_static(b"v")));
    }

    #[test]
    fn expired_entry_reads_as_miss_and_is_evicted() {
        let cache = TtlCache::new();
        cache
            .set("k", Bytes::from_static(b"v"), Duration::from_millis(20))
            .unwrap();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_removes_immediately() {
        let cache = TtlCache::new();
        cache
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .unwrap();
        cache.invalidate("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn purge_expired_sweeps_only_dead_entries() {
        let cache = TtlCache::new();
        cache
            .set("dead", Bytes::from_static(b"x"), Duration::from_millis(10))
            .unwrap();
        cache
            .set("live", Bytes::from_static(b"y"), Duration::from_secs(60))
            .unwrap();
        thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("live").unwrap(), Some(Bytes::from_static(b"y")));
    }
}
