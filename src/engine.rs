//! Allocation Engine
//!
//! Orchestrates spot search, reservation creation/termination, and
//! free-slot counter maintenance as one logical unit of work per operation.
//!
//! ## Responsibilities
//! - Enforce the `Available → Occupied → Available` spot state machine
//! - Enforce at-most-one-active-reservation per spot and per user
//! - Keep the denormalized free-slot counter in lockstep with the rows
//! - Invalidate affected cache keys strictly after the store commit
//! - Emit fire-and-forget notifications and counter bumps
//!
//! ## Ordering Contract
//! Store transaction first, cache invalidation second, counters and
//! notifications last. Nothing after the commit can fail the operation;
//! nothing before the commit touches the cache, so a racing read can never
//! repopulate state the commit is about to obsolete.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::CacheCoordinator;
use crate::error::{ParkError, Result};
use crate::lifecycle::{self, PurgeReport};
use crate::metrics::{
    Counters, LOTS_CREATED, LOTS_DELETED, RELEASES_COMPLETED, RESERVATIONS_CANCELLED,
    RESERVATIONS_TODAY, TOTAL_RESERVATIONS, USERS_CREATED, USERS_DELETED,
};
use crate::notify::{Notification, Notifier};
use crate::pricing;
use crate::store::{
    Caller, InventoryStore, Lot, LotPatch, LotSpec, Reservation, Spot, SpotState, User, UserSpec,
};

/// Payment details optionally recorded at release time
#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    /// Reference from the payment collaborator
    pub transaction_id: Option<String>,
    /// Payment method label (card, UPI, cash, ...)
    pub payment_method: Option<String>,
}

/// The engine. Owns nothing authoritative itself: the store decides, the
/// cache accelerates, the notifier and counters observe.
pub struct AllocationEngine {
    store: Arc<InventoryStore>,
    cache: CacheCoordinator,
    notifier: Arc<dyn Notifier>,
}

impl AllocationEngine {
    /// Build an engine over explicit collaborators
    pub fn new(
        store: Arc<InventoryStore>,
        cache: CacheCoordinator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
        }
    }

    /// The underlying store (tests audit invariants through this)
    pub fn store(&self) -> &Arc<InventoryStore> {
        &self.store
    }

    /// The shared counter registry
    pub fn counters(&self) -> &Counters {
        self.cache.counters()
    }

    // =========================================================================
    // Admin Operations
    // =========================================================================

    /// Create a lot and its spots atomically
    pub fn create_lot(&self, spec: LotSpec) -> Result<Lot> {
        let lot = self.store.create_lot(spec)?;
        self.cache.invalidate_lot_list();
        self.counters().incr(LOTS_CREATED);
        tracing::info!(lot_id = lot.id, slots = lot.total_slots, "lot created");
        Ok(lot)
    }

    /// Apply an explicit admin patch to a lot
    pub fn update_lot(&self, id: u64, patch: LotPatch) -> Result<Lot> {
        let lot = self.store.update_lot(id, patch)?;
        self.cache.invalidate_lot(id);
        tracing::info!(lot_id = id, "lot updated");
        Ok(lot)
    }

    /// Delete a lot whose spots were cleared first
    pub fn delete_lot(&self, id: u64) -> Result<()> {
        self.store.delete_lot(id)?;
        self.cache.invalidate_lot(id);
        self.counters().incr(LOTS_DELETED);
        tracing::info!(lot_id = id, "lot deleted");
        Ok(())
    }

    /// Delete every unoccupied spot of a lot (precursor to `delete_lot`)
    pub fn clear_lot_spots(&self, lot_id: u64) -> Result<usize> {
        let removed = self.store.clear_lot_spots(lot_id)?;
        self.cache.invalidate_lot(lot_id);
        tracing::info!(lot_id, removed, "lot spots cleared");
        Ok(removed)
    }

    /// Register a user
    pub fn create_user(&self, spec: UserSpec) -> Result<User> {
        let user = self.store.create_user(spec)?;
        self.counters().incr(USERS_CREATED);
        tracing::info!(user_id = user.id, "user created");
        Ok(user)
    }

    // =========================================================================
    // Allocate (Available → Occupied, open-ended)
    // =========================================================================

    /// Book the lowest-id available spot in a lot for `user_id`, starting now
    pub fn allocate(&self, lot_id: u64, user_id: u64) -> Result<Reservation> {
        self.allocate_at(lot_id, user_id, Utc::now())
    }

    /// Allocation with an explicit clock, for deterministic tests
    pub fn allocate_at(
        &self,
        lot_id: u64,
        user_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let reservation = self.store.transact(|t| {
            t.lot(lot_id)?;
            t.user(user_id)?;

            if let Some(active) = t.active_reservation_for(user_id, now) {
                return Err(ParkError::AlreadyActive {
                    user_id,
                    reservation_id: active.id,
                });
            }

            let free = t.lot(lot_id)?.available_slots;
            if free == 0 {
                return Err(ParkError::NoCapacity { lot_id });
            }

            // Counter says there is room; the rows must agree. If they do
            // not, the invariant is broken and we refuse to paper over it.
            let spot_id = t.lowest_available_spot(lot_id).ok_or_else(|| {
                ParkError::Corruption(format!(
                    "lot {lot_id}: counter says {free} free but no available spot row"
                ))
            })?;

            t.occupy_spot(spot_id, user_id)?;
            t.decrement_free_slots(lot_id)?;
            Ok(t.insert_reservation(spot_id, user_id, now, None, 0))
        })?;

        self.cache.invalidate_lot(lot_id);
        self.counters().incr(TOTAL_RESERVATIONS);
        self.counters()
            .incr_windowed(RESERVATIONS_TODAY, self.cache.counter_expiry());
        self.notifier.notify(Notification::Booked {
            reservation_id: reservation.id,
        });
        tracing::info!(
            reservation_id = reservation.id,
            lot_id,
            user_id,
            spot_id = reservation.spot_id,
            "spot allocated"
        );
        Ok(reservation)
    }

    // =========================================================================
    // Release (Occupied → Available)
    // =========================================================================

    /// Check out of an open reservation, computing the charge up to now
    pub fn release(
        &self,
        reservation_id: u64,
        caller: Caller,
        opts: ReleaseOptions,
    ) -> Result<Reservation> {
        self.release_at(reservation_id, caller, opts, Utc::now())
    }

    /// Release with an explicit clock, for deterministic tests
    pub fn release_at(
        &self,
        reservation_id: u64,
        caller: Caller,
        opts: ReleaseOptions,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let (reservation, lot_id) = self.store.transact(|t| {
            let (spot_id, user_id, start_time) = {
                let res = t.reservation(reservation_id)?;
                // A reservation that is already closed no longer exists as a
                // releasable thing; a repeated release is a NotFound, never a
                // second counter increment.
                if !res.is_open() {
                    return Err(ParkError::reservation_not_found(reservation_id));
                }
                (res.spot_id, res.user_id, res.start_time)
            };

            if !caller.may_act_for(user_id) {
                return Err(ParkError::AccessDenied);
            }

            let lot_id = t.spot(spot_id)?.lot_id;
            let rate_cents = t.lot(lot_id)?.rate_cents;
            let quote = pricing::quote(rate_cents, start_time, now)?;

            let updated = {
                let res = t.reservation_mut(reservation_id)?;
                res.end_time = Some(now);
                res.cost_cents = quote.cost_cents;
                res.transaction_id = opts.transaction_id.clone();
                res.payment_method = opts.payment_method.clone();
                res.clone()
            };

            t.free_spot(spot_id)?;
            t.increment_free_slots(lot_id)?;
            Ok((updated, lot_id))
        })?;

        self.cache.invalidate_lot(lot_id);
        self.counters().incr(RELEASES_COMPLETED);
        self.notifier.notify(Notification::Released {
            reservation_id: reservation.id,
        });
        tracing::info!(
            reservation_id = reservation.id,
            lot_id,
            cost_cents = reservation.cost_cents,
            "spot released"
        );
        Ok(reservation)
    }

    // =========================================================================
    // Explicit-Interval Booking
    // =========================================================================

    /// Reserve a caller-chosen spot for an explicit interval.
    ///
    /// The cost is computed immediately from the interval; the reservation
    /// is created pre-closed and the spot goes `Occupied`. The spot returns
    /// to service through [`AllocationEngine::cancel`] or, once the interval
    /// has ended, [`AllocationEngine::reclaim_expired`].
    pub fn reserve_interval(
        &self,
        spot_id: u64,
        user_id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Reservation> {
        if end <= start {
            return Err(ParkError::InvalidInterval);
        }

        let (reservation, lot_id) = self.store.transact(|t| {
            let spot = t.spot(spot_id)?;
            let lot_id = spot.lot_id;
            if spot.state != SpotState::Available {
                return Err(ParkError::NotAvailable { spot_id });
            }
            t.user(user_id)?;

            let rate_cents = t.lot(lot_id)?.rate_cents;
            let quote = pricing::quote(rate_cents, start, end)?;

            t.occupy_spot(spot_id, user_id)?;
            t.decrement_free_slots(lot_id)?;
            let res = t.insert_reservation(spot_id, user_id, start, Some(end), quote.cost_cents);
            Ok((res, lot_id))
        })?;

        self.cache.invalidate_lot(lot_id);
        self.counters().incr(TOTAL_RESERVATIONS);
        self.counters()
            .incr_windowed(RESERVATIONS_TODAY, self.cache.counter_expiry());
        self.notifier.notify(Notification::Booked {
            reservation_id: reservation.id,
        });
        tracing::info!(
            reservation_id = reservation.id,
            spot_id,
            user_id,
            cost_cents = reservation.cost_cents,
            "interval reserved"
        );
        Ok(reservation)
    }

    // =========================================================================
    // Cancel
    // =========================================================================

    /// Cancel a reservation before checkout: the row is removed (hard
    /// delete) and the spot/counter revert as a release would, without a
    /// charge
    pub fn cancel(&self, reservation_id: u64, caller: Caller) -> Result<()> {
        self.cancel_at(reservation_id, caller, Utc::now())
    }

    /// Cancel with an explicit clock, for deterministic tests
    pub fn cancel_at(&self, reservation_id: u64, caller: Caller, now: DateTime<Utc>) -> Result<()> {
        let lot_id = self.store.transact(|t| {
            let (spot_id, user_id, end_time) = {
                let res = t.reservation(reservation_id)?;
                (res.spot_id, res.user_id, res.end_time)
            };

            if !caller.may_act_for(user_id) {
                return Err(ParkError::AccessDenied);
            }

            let spot = t.spot(spot_id)?.clone();
            let lot_id = spot.lot_id;
            let holds_spot =
                spot.state == SpotState::Occupied && spot.occupant_user_id == Some(user_id);

            // A checked-out stay has nothing left to revert and stays in
            // history. An ended interval booking that still holds its spot
            // is different: cancelling it is how the spot returns to service.
            if matches!(end_time, Some(end) if end <= now) && !holds_spot {
                return Err(ParkError::Conflict(format!(
                    "reservation {reservation_id} already completed"
                )));
            }

            // Revert occupancy only if this reservation still holds the
            // spot; incrementing past the row count would corrupt the
            // counter the other way
            if holds_spot {
                t.free_spot(spot_id)?;
                t.increment_free_slots(lot_id)?;
            }

            t.remove_reservation(reservation_id)?;
            Ok(lot_id)
        })?;

        self.cache.invalidate_lot(lot_id);
        self.counters().incr(RESERVATIONS_CANCELLED);
        tracing::info!(reservation_id, lot_id, "reservation cancelled");
        Ok(())
    }

    // =========================================================================
    // Interval Expiry Reclamation
    // =========================================================================

    /// Return every spot whose interval booking has ended to service.
    ///
    /// The paid reservation rows stay in history; only the spot state and
    /// the free-slot counter revert. Returns how many spots were freed.
    pub fn reclaim_expired(&self) -> Result<usize> {
        self.reclaim_expired_at(Utc::now())
    }

    /// Reclamation with an explicit clock, for deterministic tests
    pub fn reclaim_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let (freed, lots_touched) = self.store.transact(|t| {
            let expired: Vec<(u64, u64)> = t
                .spots()
                .filter(|s| s.state == SpotState::Occupied)
                .filter(|s| t.active_reservation_for_spot(s.id, now).is_none())
                .map(|s| (s.id, s.lot_id))
                .collect();

            let mut lots: Vec<u64> = Vec::new();
            for (spot_id, lot_id) in &expired {
                t.free_spot(*spot_id)?;
                t.increment_free_slots(*lot_id)?;
                if !lots.contains(lot_id) {
                    lots.push(*lot_id);
                }
            }
            Ok((expired.len(), lots))
        })?;

        for lot_id in &lots_touched {
            self.cache.invalidate_lot(*lot_id);
        }
        if freed > 0 {
            tracing::info!(freed, "expired interval bookings reclaimed");
        }
        Ok(freed)
    }

    // =========================================================================
    // Lifecycle Guard
    // =========================================================================

    /// Remove a user and every reference to them, as one atomic unit
    pub fn purge_user(&self, user_id: u64) -> Result<PurgeReport> {
        self.purge_user_at(user_id, Utc::now())
    }

    /// Purge with an explicit clock, for deterministic tests
    pub fn purge_user_at(&self, user_id: u64, now: DateTime<Utc>) -> Result<PurgeReport> {
        let report = self
            .store
            .transact(|t| lifecycle::purge_user_txn(t, user_id, now))?;

        for lot_id in &report.lots_touched {
            self.cache.invalidate_lot(*lot_id);
        }
        self.cache.invalidate_user(user_id);
        self.counters().incr(USERS_DELETED);
        tracing::info!(
            user_id,
            released = report.closed_reservations.len(),
            purged = report.reservations_deleted,
            "user purged"
        );
        Ok(report)
    }

    // =========================================================================
    // Read Paths (cache-accelerated, display only)
    // =========================================================================

    /// A lot snapshot, served from cache when live.
    ///
    /// Display data only: allocation decisions always read the store inside
    /// a transaction, never this path.
    pub fn lot_view(&self, id: u64) -> Result<Lot> {
        if let Some(lot) = self.cache.get_lot(id) {
            return Ok(lot);
        }
        let lot = self.store.get_lot(id)?;
        self.cache.put_lot(&lot);
        Ok(lot)
    }

    /// All lots, served from cache when live
    pub fn lots_view(&self) -> Vec<Lot> {
        if let Some(lots) = self.cache.get_lots() {
            return lots;
        }
        let lots = self.store.list_lots();
        self.cache.put_lots(&lots);
        lots
    }

    /// A user projection, served from cache when live
    pub fn user_view(&self, id: u64) -> Result<User> {
        if let Some(user) = self.cache.get_user(id) {
            return Ok(user);
        }
        let user = self.store.get_user(id)?;
        self.cache.put_user(&user);
        Ok(user)
    }

    /// The available spots of a lot, lowest id first (uncached)
    pub fn available_spots(&self, lot_id: u64) -> Result<Vec<Spot>> {
        self.store.available_spots(lot_id)
    }

    /// A user's reservation history, newest first. Owner-or-admin only.
    pub fn user_reservations(&self, user_id: u64, caller: Caller) -> Result<Vec<Reservation>> {
        if !caller.may_act_for(user_id) {
            return Err(ParkError::AccessDenied);
        }
        self.store.get_user(user_id)?;
        let mut reservations =
            self.store
                .read(|t| t.reservations_for_user(user_id).cloned().collect::<Vec<_>>());
        reservations.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(reservations)
    }
}
