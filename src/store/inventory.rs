//! InventoryStore implementation
//!
//! BTreeMap tables behind one RwLock, with copy-validate-commit transactions.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
//!
//! - **Mutations** (`transact`): serialized by the write lock
//!   - The closure runs against a scratch copy of the tables
//!   - On `Ok` the scratch replaces the live tables in one assignment
//!   - On `Err` the scratch is dropped — the store is untouched
//!   - Two concurrent allocations therefore cannot both observe the same
//!     free slot: the second one re-reads state the first already committed
//!
//! - **Reads** (`read`): concurrent, shared lock, no scratch copy

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{ParkError, Result};

use super::{Lot, LotPatch, LotSpec, Reservation, Spot, SpotState, User, UserSpec};

// =============================================================================
// Tables
// =============================================================================

/// The full table set. Cloneable so a transaction can work on a scratch copy.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    lots: BTreeMap<u64, Lot>,
    spots: BTreeMap<u64, Spot>,
    reservations: BTreeMap<u64, Reservation>,
    users: BTreeMap<u64, User>,

    next_lot_id: u64,
    next_spot_id: u64,
    next_reservation_id: u64,
    next_user_id: u64,
}

impl Tables {
    // =========================================================================
    // Row Accessors
    // =========================================================================

    /// Look up a lot row
    pub fn lot(&self, id: u64) -> Result<&Lot> {
        self.lots.get(&id).ok_or_else(|| ParkError::lot_not_found(id))
    }

    /// Look up a spot row
    pub fn spot(&self, id: u64) -> Result<&Spot> {
        self.spots.get(&id).ok_or_else(|| ParkError::spot_not_found(id))
    }

    /// Look up a reservation row
    pub fn reservation(&self, id: u64) -> Result<&Reservation> {
        self.reservations
            .get(&id)
            .ok_or_else(|| ParkError::reservation_not_found(id))
    }

    /// Look up a user row
    pub fn user(&self, id: u64) -> Result<&User> {
        self.users.get(&id).ok_or_else(|| ParkError::user_not_found(id))
    }

    /// All lots, ordered by id
    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.values()
    }

    /// All spots, ordered by id
    pub fn spots(&self) -> impl Iterator<Item = &Spot> {
        self.spots.values()
    }

    /// All spots belonging to a lot, ordered by id
    pub fn spots_in_lot(&self, lot_id: u64) -> impl Iterator<Item = &Spot> {
        self.spots.values().filter(move |s| s.lot_id == lot_id)
    }

    /// All reservations held by a user, ordered by id
    pub fn reservations_for_user(&self, user_id: u64) -> impl Iterator<Item = &Reservation> {
        self.reservations.values().filter(move |r| r.user_id == user_id)
    }

    // =========================================================================
    // Query Helpers
    // =========================================================================

    /// Lowest-id `Available` spot in a lot (deterministic tie-break)
    pub fn lowest_available_spot(&self, lot_id: u64) -> Option<u64> {
        self.spots
            .values()
            .find(|s| s.lot_id == lot_id && s.state == SpotState::Available)
            .map(|s| s.id)
    }

    /// The reservation currently blocking `user_id` from booking, if any.
    ///
    /// Open reservations always block; a pre-closed interval blocks until
    /// its end time has passed.
    pub fn active_reservation_for(&self, user_id: u64, now: DateTime<Utc>) -> Option<&Reservation> {
        self.reservations
            .values()
            .find(|r| r.user_id == user_id && r.is_active_at(now))
    }

    /// The open (`end_time = None`) reservation on a spot, if any
    pub fn open_reservation_for_spot(&self, spot_id: u64) -> Option<&Reservation> {
        self.reservations
            .values()
            .find(|r| r.spot_id == spot_id && r.is_open())
    }

    /// The reservation still holding a spot at `now`: open, or a pre-closed
    /// interval whose end has not yet passed
    pub fn active_reservation_for_spot(
        &self,
        spot_id: u64,
        now: DateTime<Utc>,
    ) -> Option<&Reservation> {
        self.reservations
            .values()
            .find(|r| r.spot_id == spot_id && r.is_active_at(now))
    }

    // =========================================================================
    // Lot Mutations
    // =========================================================================

    /// Create a lot and exactly `total_slots` spots in one unit
    pub fn insert_lot(&mut self, spec: LotSpec) -> Result<Lot> {
        validate_required("location_name", &spec.location_name)?;
        validate_required("address", &spec.address)?;
        validate_required("pincode", &spec.pincode)?;
        if spec.total_slots == 0 {
            return Err(ParkError::Validation("total_slots must be positive".into()));
        }
        if spec.rate_cents == 0 {
            return Err(ParkError::Validation("rate_cents must be positive".into()));
        }

        self.next_lot_id += 1;
        let lot = Lot {
            id: self.next_lot_id,
            location_name: spec.location_name,
            rate_cents: spec.rate_cents,
            address: spec.address,
            pincode: spec.pincode,
            total_slots: spec.total_slots,
            available_slots: spec.total_slots,
        };
        self.lots.insert(lot.id, lot.clone());

        for _ in 0..spec.total_slots {
            self.next_spot_id += 1;
            let spot = Spot {
                id: self.next_spot_id,
                lot_id: lot.id,
                state: SpotState::Available,
                occupant_user_id: None,
            };
            self.spots.insert(spot.id, spot);
        }

        Ok(lot)
    }

    /// Apply an explicit admin patch, field by field, verbatim.
    ///
    /// `total_slots`/`available_slots` overwrites are NOT reconciled against
    /// the spot rows (documented hazard — admin intent is ambiguous).
    pub fn apply_lot_patch(&mut self, id: u64, patch: LotPatch) -> Result<Lot> {
        if let Some(name) = &patch.location_name {
            validate_required("location_name", name)?;
        }
        if let Some(addr) = &patch.address {
            validate_required("address", addr)?;
        }
        if let Some(pin) = &patch.pincode {
            validate_required("pincode", pin)?;
        }
        if patch.rate_cents == Some(0) {
            return Err(ParkError::Validation("rate_cents must be positive".into()));
        }
        if patch.total_slots == Some(0) {
            return Err(ParkError::Validation("total_slots must be positive".into()));
        }

        let lot = self
            .lots
            .get_mut(&id)
            .ok_or_else(|| ParkError::lot_not_found(id))?;

        if let Some(name) = patch.location_name {
            lot.location_name = name;
        }
        if let Some(rate) = patch.rate_cents {
            lot.rate_cents = rate;
        }
        if let Some(addr) = patch.address {
            lot.address = addr;
        }
        if let Some(pin) = patch.pincode {
            lot.pincode = pin;
        }
        if let Some(total) = patch.total_slots {
            lot.total_slots = total;
        }
        if let Some(avail) = patch.available_slots {
            lot.available_slots = avail;
        }

        Ok(lot.clone())
    }

    /// Delete a lot. The caller must have removed its spots first.
    pub fn delete_lot(&mut self, id: u64) -> Result<()> {
        self.lot(id)?;
        if self.spots_in_lot(id).next().is_some() {
            return Err(ParkError::Conflict(format!(
                "lot {id} still owns spots; clear them first"
            )));
        }
        self.lots.remove(&id);
        Ok(())
    }

    /// Delete every spot in a lot, failing if any is occupied.
    ///
    /// Leaves `available_slots` at 0, since zero spots remain available.
    pub fn clear_lot_spots(&mut self, lot_id: u64) -> Result<usize> {
        self.lot(lot_id)?;
        if let Some(spot) = self
            .spots_in_lot(lot_id)
            .find(|s| s.state == SpotState::Occupied)
        {
            return Err(ParkError::Conflict(format!(
                "spot {} in lot {lot_id} is occupied",
                spot.id
            )));
        }
        let ids: Vec<u64> = self.spots_in_lot(lot_id).map(|s| s.id).collect();
        for id in &ids {
            self.spots.remove(id);
        }
        if let Some(lot) = self.lots.get_mut(&lot_id) {
            lot.available_slots = 0;
        }
        Ok(ids.len())
    }

    // =========================================================================
    // Spot & Counter Mutations (engine primitives)
    // =========================================================================

    /// `Available → Occupied` with the given occupant
    pub fn occupy_spot(&mut self, spot_id: u64, user_id: u64) -> Result<()> {
        let spot = self
            .spots
            .get_mut(&spot_id)
            .ok_or_else(|| ParkError::spot_not_found(spot_id))?;
        if spot.state != SpotState::Available {
            return Err(ParkError::NotAvailable { spot_id });
        }
        spot.state = SpotState::Occupied;
        spot.occupant_user_id = Some(user_id);
        Ok(())
    }

    /// `Occupied → Available`, clearing the occupant
    pub fn free_spot(&mut self, spot_id: u64) -> Result<()> {
        let spot = self
            .spots
            .get_mut(&spot_id)
            .ok_or_else(|| ParkError::spot_not_found(spot_id))?;
        spot.state = SpotState::Available;
        spot.occupant_user_id = None;
        Ok(())
    }

    /// Decrement the free-slot counter.
    ///
    /// An underflow here means the caller's precondition check and the
    /// counter disagree — surfaced as corruption, never clamped.
    pub fn decrement_free_slots(&mut self, lot_id: u64) -> Result<()> {
        let lot = self
            .lots
            .get_mut(&lot_id)
            .ok_or_else(|| ParkError::lot_not_found(lot_id))?;
        if lot.available_slots == 0 {
            return Err(ParkError::Corruption(format!(
                "free-slot counter underflow on lot {lot_id}"
            )));
        }
        lot.available_slots -= 1;
        Ok(())
    }

    /// Increment the free-slot counter, capped at `total_slots`
    pub fn increment_free_slots(&mut self, lot_id: u64) -> Result<()> {
        let lot = self
            .lots
            .get_mut(&lot_id)
            .ok_or_else(|| ParkError::lot_not_found(lot_id))?;
        if lot.available_slots < lot.total_slots {
            lot.available_slots += 1;
        }
        Ok(())
    }

    // =========================================================================
    // Reservation Mutations
    // =========================================================================

    /// Insert a reservation row and return it
    pub fn insert_reservation(
        &mut self,
        spot_id: u64,
        user_id: u64,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        cost_cents: u64,
    ) -> Reservation {
        self.next_reservation_id += 1;
        let res = Reservation {
            id: self.next_reservation_id,
            spot_id,
            user_id,
            start_time,
            end_time,
            cost_cents,
            transaction_id: None,
            payment_method: None,
        };
        self.reservations.insert(res.id, res.clone());
        res
    }

    /// Mutable access to a reservation row
    pub fn reservation_mut(&mut self, id: u64) -> Result<&mut Reservation> {
        self.reservations
            .get_mut(&id)
            .ok_or_else(|| ParkError::reservation_not_found(id))
    }

    /// Remove a reservation row (hard delete, used by cancel and purge)
    pub fn remove_reservation(&mut self, id: u64) -> Result<Reservation> {
        self.reservations
            .remove(&id)
            .ok_or_else(|| ParkError::reservation_not_found(id))
    }

    // =========================================================================
    // User Mutations
    // =========================================================================

    /// Register a user, enforcing username/email/vehicle uniqueness
    pub fn insert_user(&mut self, spec: UserSpec) -> Result<User> {
        validate_required("username", &spec.username)?;
        validate_required("email", &spec.email)?;

        let username = spec.username.trim().to_string();
        let email = spec.email.trim().to_lowercase();

        if self
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&username))
        {
            return Err(ParkError::Conflict(format!(
                "username {username} already exists"
            )));
        }
        if self.users.values().any(|u| u.email == email) {
            return Err(ParkError::Conflict(format!("email {email} already exists")));
        }
        if let Some(vehicle) = &spec.vehicle_number {
            if self
                .users
                .values()
                .any(|u| u.vehicle_number.as_deref() == Some(vehicle.as_str()))
            {
                return Err(ParkError::Conflict(format!(
                    "vehicle number {vehicle} already exists"
                )));
            }
        }

        self.next_user_id += 1;
        let user = User {
            id: self.next_user_id,
            username,
            email,
            role: spec.role,
            vehicle_number: spec.vehicle_number,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Remove a user row (the Lifecycle Guard purges references first)
    pub fn remove_user(&mut self, id: u64) -> Result<User> {
        self.users
            .remove(&id)
            .ok_or_else(|| ParkError::user_not_found(id))
    }

    // =========================================================================
    // Invariant Audit
    // =========================================================================

    /// Verify the core invariants, reporting the first violation found:
    ///
    /// 1. per lot: `available_slots == count(spots in Available state)`
    /// 2. per spot: occupant present iff `Occupied`, and at most one open
    ///    reservation references it
    /// 3. per user: at most one open reservation system-wide
    pub fn check_invariants(&self) -> Result<()> {
        for lot in self.lots.values() {
            let available = self
                .spots_in_lot(lot.id)
                .filter(|s| s.state == SpotState::Available)
                .count() as u32;
            if available != lot.available_slots {
                return Err(ParkError::Corruption(format!(
                    "lot {}: counter says {} free, rows say {}",
                    lot.id, lot.available_slots, available
                )));
            }
        }

        for spot in self.spots.values() {
            let has_occupant = spot.occupant_user_id.is_some();
            let occupied = spot.state == SpotState::Occupied;
            if has_occupant != occupied {
                return Err(ParkError::Corruption(format!(
                    "spot {}: occupant/state mismatch",
                    spot.id
                )));
            }
            let open = self
                .reservations
                .values()
                .filter(|r| r.spot_id == spot.id && r.is_open())
                .count();
            if open > 1 {
                return Err(ParkError::Corruption(format!(
                    "spot {}: {open} open reservations",
                    spot.id
                )));
            }
        }

        let mut seen_users: Vec<u64> = Vec::new();
        for res in self.reservations.values().filter(|r| r.is_open()) {
            if seen_users.contains(&res.user_id) {
                return Err(ParkError::Corruption(format!(
                    "user {}: multiple open reservations",
                    res.user_id
                )));
            }
            seen_users.push(res.user_id);
        }

        Ok(())
    }
}

// =============================================================================
// InventoryStore
// =============================================================================

/// The authoritative store.
///
/// All multi-row mutations go through [`InventoryStore::transact`]; a failed
/// transaction leaves the store in its pre-call state. Reads never block
/// other reads.
#[derive(Debug, Default)]
pub struct InventoryStore {
    tables: RwLock<Tables>,
}

impl InventoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a read-only closure under the shared lock
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.tables.read())
    }

    /// Run a mutation as one atomic unit.
    ///
    /// The closure receives a scratch copy of the tables. If it returns
    /// `Ok`, the scratch is committed in a single assignment under the write
    /// lock; if it returns `Err`, nothing is applied. Partial application
    /// (counter updated, spot not, or vice versa) is therefore impossible.
    pub fn transact<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut guard = self.tables.write();
        let mut scratch = guard.clone();
        let out = f(&mut scratch)?;
        *guard = scratch;
        Ok(out)
    }

    // =========================================================================
    // Store Contract (simple CRUD, §4.1)
    // =========================================================================

    /// Create a lot and its spots atomically
    pub fn create_lot(&self, spec: LotSpec) -> Result<Lot> {
        self.transact(|t| t.insert_lot(spec))
    }

    /// Fetch a lot by id
    pub fn get_lot(&self, id: u64) -> Result<Lot> {
        self.read(|t| t.lot(id).cloned())
    }

    /// Fetch a spot by id
    pub fn get_spot(&self, id: u64) -> Result<Spot> {
        self.read(|t| t.spot(id).cloned())
    }

    /// Fetch a reservation by id
    pub fn get_reservation(&self, id: u64) -> Result<Reservation> {
        self.read(|t| t.reservation(id).cloned())
    }

    /// Fetch a user by id
    pub fn get_user(&self, id: u64) -> Result<User> {
        self.read(|t| t.user(id).cloned())
    }

    /// All lots, ordered by id
    pub fn list_lots(&self) -> Vec<Lot> {
        self.read(|t| t.lots().cloned().collect())
    }

    /// Apply an explicit admin patch to a lot
    pub fn update_lot(&self, id: u64, patch: LotPatch) -> Result<Lot> {
        self.transact(|t| t.apply_lot_patch(id, patch))
    }

    /// Delete a lot whose spots have already been cleared
    pub fn delete_lot(&self, id: u64) -> Result<()> {
        self.transact(|t| t.delete_lot(id))
    }

    /// Delete every (unoccupied) spot in a lot; returns how many were removed
    pub fn clear_lot_spots(&self, lot_id: u64) -> Result<usize> {
        self.transact(|t| t.clear_lot_spots(lot_id))
    }

    /// Register a user
    pub fn create_user(&self, spec: UserSpec) -> Result<User> {
        self.transact(|t| t.insert_user(spec))
    }

    /// The `Available` spots of a lot, lowest id first
    pub fn available_spots(&self, lot_id: u64) -> Result<Vec<Spot>> {
        self.read(|t| {
            t.lot(lot_id)?;
            Ok(t.spots_in_lot(lot_id)
                .filter(|s| s.state == SpotState::Available)
                .cloned()
                .collect())
        })
    }

    /// Audit the counter-vs-rows and reservation invariants
    pub fn check_invariants(&self) -> Result<()> {
        self.read(|t| t.check_invariants())
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Reject missing/blank required string fields
fn validate_required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ParkError::Validation(format!("{field} is required")));
    }
    Ok(())
}
