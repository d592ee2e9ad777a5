//! Lifecycle Guard
//!
//! Cross-entity cleanup when a user is removed: no reservation, spot, or
//! lot may be left referencing the departed user. The whole algorithm runs
//! inside a single store transaction — a failure at any step rolls back
//! everything, so a partially deleted user is never observable.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::pricing;
use crate::store::{SpotState, Tables};

/// What a user purge did, for logging and cache invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    /// The removed user
    pub user_id: u64,
    /// Open reservations that were force-released (with computed cost)
    pub closed_reservations: Vec<u64>,
    /// Total reservation rows deleted, historical ones included
    pub reservations_deleted: usize,
    /// Lots whose free-slot counter changed, for cache invalidation
    pub lots_touched: Vec<u64>,
}

/// The in-transaction purge algorithm.
///
/// 1. Force-release every open reservation of the user (cost computed as a
///    normal checkout at `now`)
/// 2. Defensive pass: clear any spot still naming the user as occupant
/// 3. Hard-delete every reservation row of the user
/// 4. Delete the user row
pub(crate) fn purge_user_txn(
    tables: &mut Tables,
    user_id: u64,
    now: DateTime<Utc>,
) -> Result<PurgeReport> {
    tables.user(user_id)?;

    let mut lots_touched: Vec<u64> = Vec::new();
    let mut closed: Vec<u64> = Vec::new();

    // Step 1: synthesize a release for each open reservation
    let open_ids: Vec<u64> = tables
        .reservations_for_user(user_id)
        .filter(|r| r.is_open())
        .map(|r| r.id)
        .collect();

    for res_id in open_ids {
        let (spot_id, start_time) = {
            let res = tables.reservation(res_id)?;
            (res.spot_id, res.start_time)
        };
        let lot_id = tables.spot(spot_id)?.lot_id;
        let rate_cents = tables.lot(lot_id)?.rate_cents;

        let quote = pricing::quote(rate_cents, start_time, now)?;
        {
            let res = tables.reservation_mut(res_id)?;
            res.end_time = Some(now);
            res.cost_cents = quote.cost_cents;
        }

        tables.free_spot(spot_id)?;
        tables.increment_free_slots(lot_id)?;
        if !lots_touched.contains(&lot_id) {
            lots_touched.push(lot_id);
        }
        closed.push(res_id);
    }

    // Step 2: clear spots still referencing the user (should find none
    // after step 1; a hit here means prior state was already inconsistent,
    // and the purge leaves it consistent)
    let stale_spots: Vec<(u64, u64)> = tables
        .spots()
        .filter(|s| s.state == SpotState::Occupied && s.occupant_user_id == Some(user_id))
        .map(|s| (s.id, s.lot_id))
        .collect();

    for (spot_id, lot_id) in stale_spots {
        tables.free_spot(spot_id)?;
        tables.increment_free_slots(lot_id)?;
        if !lots_touched.contains(&lot_id) {
            lots_touched.push(lot_id);
        }
    }

    // Step 3: purge every reservation row, historical ones included, so no
    // foreign reference dangles
    let all_ids: Vec<u64> = tables.reservations_for_user(user_id).map(|r| r.id).collect();
    for res_id in &all_ids {
        tables.remove_reservation(*res_id)?;
    }

    // Step 4: the user row itself
    tables.remove_user(user_id)?;

    Ok(PurgeReport {
        user_id,
        closed_reservations: closed,
        reservations_deleted: all_ids.len(),
        lots_touched,
    })
}
