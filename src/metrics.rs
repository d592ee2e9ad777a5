//! Observability counters
//!
//! Monotonic, fire-and-forget counters with no rollback semantics. The
//! engine bumps them after successful commits; loss or duplication on a
//! failure path is acceptable and must never block the primary operation,
//! so every method here is infallible.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

// Well-known counter names bumped by the engine
pub const TOTAL_RESERVATIONS: &str = "total_reservations";
pub const RESERVATIONS_TODAY: &str = "reservations_today";
pub const RESERVATIONS_CANCELLED: &str = "reservations_cancelled";
pub const RELEASES_COMPLETED: &str = "releases_completed";
pub const LOTS_CREATED: &str = "lots_created";
pub const LOTS_DELETED: &str = "lots_deleted";
pub const USERS_CREATED: &str = "users_created";
pub const USERS_DELETED: &str = "users_deleted";
pub const CACHE_HITS: &str = "cache_hits";
pub const CACHE_MISSES: &str = "cache_misses";

struct Cell {
    value: u64,
    expires_at: Option<Instant>,
}

impl Cell {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// Shared counter registry (increment / read / expire).
///
/// Cheap to clone; all clones share the same cells.
#[derive(Clone, Default)]
pub struct Counters {
    cells: Arc<Mutex<HashMap<String, Cell>>>,
}

impl Counters {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter and return its new value
    pub fn incr(&self, name: &str) -> u64 {
        self.incr_by(name, 1, None)
    }

    /// Increment a windowed counter: it resets once `window` elapses after
    /// its first bump (daily-tally style)
    pub fn incr_windowed(&self, name: &str, window: Duration) -> u64 {
        self.incr_by(name, 1, Some(window))
    }

    /// Current value; expired or unknown counters read as 0
    pub fn read(&self, name: &str) -> u64 {
        let now = Instant::now();
        let cells = self.cells.lock();
        match cells.get(name) {
            Some(cell) if !cell.is_expired(now) => cell.value,
            _ => 0,
        }
    }

    /// Attach (or reset) an expiry window on an existing counter
    pub fn expire(&self, name: &str, window: Duration) {
        let mut cells = self.cells.lock();
        if let Some(cell) = cells.get_mut(name) {
            cell.expires_at = Some(Instant::now() + window);
        }
    }

    /// Snapshot of all live counters, for reporting
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let now = Instant::now();
        let cells = self.cells.lock();
        let mut out: Vec<(String, u64)> = cells
            .iter()
            .filter(|(_, c)| !c.is_expired(now))
            .map(|(k, c)| (k.clone(), c.value))
            .collect();
        out.sort();
        out
    }

    fn incr_by(&self, name: &str, delta: u64, window: Option<Duration>) -> u64 {
        let now = Instant::now();
        let mut cells = self.cells.lock();
        let cell = cells.entry(name.to_string()).or_insert(Cell {
            value: 0,
            expires_at: window.map(|w| now + w),
        });
        if cell.is_expired(now) {
            cell.value = 0;
            cell.expires_at = window.map(|w| now + w);
        }
        cell.value += delta;
        cell.value
    }
}
