//! # Lotkeeper
//!
//! A parking inventory and reservation consistency engine with:
//! - Atomic spot state transitions with a denormalized free-slot counter
//! - At-most-one-active-reservation invariants per spot and per user
//! - Hour-rounding pricing with a one-hour floor
//! - A bounded-staleness TTL cache that never gates correctness
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Request Handlers                          │
//! │                 (concurrent, external)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Allocation Engine                            │
//! │      allocate / release / reserve-interval / cancel          │
//! └───────┬─────────────────────────┬─────────────────┬─────────┘
//!         │ transactions            │ invalidate      │ fire-and-forget
//!         ▼                         ▼                 ▼
//!  ┌─────────────┐          ┌─────────────┐    ┌─────────────┐
//!  │  Inventory  │          │    Cache    │    │  Notifier / │
//!  │    Store    │          │ Coordinator │    │  Counters   │
//!  │  (RwLock)   │          │  (TTL ≈10s) │    │ (best-effort)│
//!  └─────────────┘          └─────────────┘    └─────────────┘
//! ```
//!
//! The store is the single source of truth; every multi-row mutation runs
//! as one atomic transaction with full rollback. The cache is invalidated
//! only after commits and expires on its own TTL otherwise — it is never
//! consulted for an allocation decision.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod pricing;
pub mod engine;
pub mod lifecycle;
pub mod cache;
pub mod metrics;
pub mod notify;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ParkError, Result};
pub use config::Config;
pub use engine::{AllocationEngine, ReleaseOptions};
pub use store::{Caller, InventoryStore, Lot, LotPatch, LotSpec, Reservation, Role, Spot,
    SpotState, User, UserSpec};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Lotkeeper
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
