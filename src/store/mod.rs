//! Inventory Store Module
//!
//! The system-of-record tables for lots, spots, reservations, and users.
//!
//! ## Responsibilities
//! - Own every entity row and the per-lot free-slot counter
//! - Apply every multi-row mutation as one atomic unit (full rollback)
//! - Serve consistent reads to the Allocation Engine and cache
//! - Audit the counter-vs-rows invariant on demand
//!
//! ## Data Structure Choice
//! BTreeMap tables wrapped in a single RwLock:
//! - Ordered keys give the deterministic lowest-id spot tie-break for free
//! - One lock over the whole table set keeps cross-table mutations atomic
//! - Simple and correct first, shard later if it ever matters

mod inventory;

pub use inventory::{InventoryStore, Tables};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Entities
// =============================================================================

/// Occupancy state of a single spot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpotState {
    /// Free for allocation
    Available,
    /// Held by exactly one user
    Occupied,
}

/// A physical parking facility with a fixed slot count and hourly rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Identity (assigned by the store)
    pub id: u64,
    /// Human-readable location name
    pub location_name: String,
    /// Hourly rate in integer cents
    pub rate_cents: u64,
    /// Street address
    pub address: String,
    /// Postal code
    pub pincode: String,
    /// Fixed slot count, immutable outside an explicit admin patch
    pub total_slots: u32,
    /// Denormalized count of spots currently `Available`.
    ///
    /// Invariant: equals the number of this lot's spots in `Available` state.
    /// Mutated only inside store transactions, except for the documented
    /// admin-override hazard in [`LotPatch`].
    pub available_slots: u32,
}

/// One allocatable parking space within a lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spot {
    /// Identity (assigned by the store)
    pub id: u64,
    /// Owning lot, immutable
    pub lot_id: u64,
    /// Current occupancy state
    pub state: SpotState,
    /// Occupant; present iff `state == Occupied`
    pub occupant_user_id: Option<u64>,
}

/// A time-bounded (or open-ended) occupancy record linking a user to a spot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Identity (assigned by the store)
    pub id: u64,
    /// Reserved spot
    pub spot_id: u64,
    /// Holder
    pub user_id: u64,
    /// When occupancy started (or is scheduled to start)
    pub start_time: DateTime<Utc>,
    /// None while the reservation is open; set on release or for
    /// explicit-interval bookings
    pub end_time: Option<DateTime<Utc>>,
    /// 0 until checkout, then the computed charge in cents
    pub cost_cents: u64,
    /// Payment transaction reference, recorded at release
    pub transaction_id: Option<String>,
    /// Payment method, recorded at release
    pub payment_method: Option<String>,
}

impl Reservation {
    /// True while the occupant has not checked out
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// True if this reservation blocks the user from booking another spot:
    /// open, or a pre-closed interval whose end is still in the future
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.end_time {
            None => true,
            Some(end) => end > now,
        }
    }
}

/// Authorization role of a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Regular user: may only act on their own reservations
    User,
    /// Administrative override: may act on anything
    Admin,
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity (assigned by the store)
    pub id: u64,
    /// Unique username
    pub username: String,
    /// Unique email address
    pub email: String,
    /// Authorization role
    pub role: Role,
    /// Optional unique vehicle registration
    pub vehicle_number: Option<String>,
}

/// Caller identity passed to owner-checked engine operations.
///
/// Authorization decisions themselves live with an external collaborator;
/// the engine only honors the role it is handed.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    /// Acting user id
    pub user_id: u64,
    /// Role granted by the identity collaborator
    pub role: Role,
}

impl Caller {
    /// Whether this caller may act on records owned by `owner_id`
    pub fn may_act_for(&self, owner_id: u64) -> bool {
        self.role == Role::Admin || self.user_id == owner_id
    }
}

// =============================================================================
// Creation Specs & Patches
// =============================================================================

/// Input for creating a lot together with its spots
#[derive(Debug, Clone)]
pub struct LotSpec {
    /// Human-readable location name (required, non-empty)
    pub location_name: String,
    /// Hourly rate in cents (required, positive)
    pub rate_cents: u64,
    /// Street address (required, non-empty)
    pub address: String,
    /// Postal code (required, non-empty)
    pub pincode: String,
    /// Number of spots to create atomically with the lot (required, positive)
    pub total_slots: u32,
}

/// Explicit partial update for a lot.
///
/// Only the fields listed here may legally be overwritten; each is validated
/// on its own. Supplying both `total_slots` and `available_slots` applies
/// them verbatim — the store does not recompute consistency on an explicit
/// admin overwrite. That override can desynchronize the free-slot counter;
/// [`InventoryStore::check_invariants`] will report it as corruption.
#[derive(Debug, Clone, Default)]
pub struct LotPatch {
    /// New location name
    pub location_name: Option<String>,
    /// New hourly rate in cents
    pub rate_cents: Option<u64>,
    /// New street address
    pub address: Option<String>,
    /// New postal code
    pub pincode: Option<String>,
    /// Verbatim overwrite of the slot count
    pub total_slots: Option<u32>,
    /// Verbatim overwrite of the free-slot counter
    pub available_slots: Option<u32>,
}

/// Input for registering a user
#[derive(Debug, Clone)]
pub struct UserSpec {
    /// Unique username (required, non-empty)
    pub username: String,
    /// Unique email (required, non-empty)
    pub email: String,
    /// Authorization role
    pub role: Role,
    /// Optional unique vehicle registration
    pub vehicle_number: Option<String>,
}
