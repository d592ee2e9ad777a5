//! Cache Coordinator Module
//!
//! Bounded-TTL read-through cache plus explicit invalidation hooks.
//!
//! ## Responsibilities
//! - Serve entity snapshots from memory with a short, per-key-class TTL
//! - Invalidate affected keys after (never before) a store commit
//! - Swallow every cache failure — the store is always authoritative
//!
//! ## Correctness Posture
//! The cache is never consulted for a correctness decision. The TTL is
//! deliberately small (≈10s) to bound staleness rather than to maximize hit
//! rate; availability data changes too frequently for anything longer.
//! A miss, an expired entry, and a backend failure are all the same thing
//! to a caller: fall through to the store.

mod coordinator;
mod ttl;

pub use coordinator::CacheCoordinator;
pub use ttl::TtlCache;

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

// =============================================================================
// Key Scheme
// =============================================================================

/// Aggregate key for the full lot list
pub const LOTS_ALL_KEY: &str = "lots:all";

/// Per-entity key for a lot snapshot
pub fn lot_key(id: u64) -> String {
    format!("lot:{id}")
}

/// Per-entity key for a user projection
pub fn user_key(id: u64) -> String {
    format!("user:{id}")
}

// =============================================================================
// Backend Seam
// =============================================================================

/// Error raised by a cache backend.
///
/// These never propagate past the coordinator: they are logged and treated
/// as misses.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend itself failed (connection loss, eviction race, ...)
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A stored snapshot failed to encode or decode
    #[error("cache codec error: {0}")]
    Codec(String),
}

/// Narrow key-value contract consumed by the coordinator.
///
/// An explicit dependency, not ambient state: tests substitute [`NoopCache`]
/// without changing engine behavior.
pub trait SnapshotCache: Send + Sync {
    /// Fetch a live (non-expired) value
    fn get(&self, key: &str) -> std::result::Result<Option<Bytes>, CacheError>;

    /// Store a value with an explicit TTL
    fn set(&self, key: &str, value: Bytes, ttl: Duration) -> std::result::Result<(), CacheError>;

    /// Drop a key immediately
    fn invalidate(&self, key: &str) -> std::result::Result<(), CacheError>;
}

/// Cache that stores nothing and never hits. Used by tests and by callers
/// that want the engine without an acceleration layer.
#[derive(Debug, Default)]
pub struct NoopCache;

impl SnapshotCache for NoopCache {
    fn get(&self, _key: &str) -> std::result::Result<Option<Bytes>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> std::result::Result<(), CacheError> {
        Ok(())
    }

    fn invalidate(&self, _key: &str) -> std::result::Result<(), CacheError> {
        Ok(())
    }
}
