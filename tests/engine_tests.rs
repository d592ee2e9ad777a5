//! Tests for the Allocation Engine
//!
//! These tests verify:
//! - The Available → Occupied → Available state machine
//! - Free-slot counter maintenance across every transition
//! - Per-user and per-spot single-active-reservation enforcement
//! - Release pricing, idempotence, and access control
//! - Behavior under concurrent allocation pressure

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, Utc};

use lotkeeper::cache::{CacheCoordinator, TtlCache};
use lotkeeper::metrics::{Counters, RELEASES_COMPLETED, RESERVATIONS_TODAY, TOTAL_RESERVATIONS};
use lotkeeper::notify::{ChannelNotifier, Notification, NoopNotifier};
use lotkeeper::{
    AllocationEngine, Caller, Config, InventoryStore, LotSpec, ParkError, ReleaseOptions, Role,
    SpotState, UserSpec,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_engine() -> AllocationEngine {
    let config = Config::default();
    let store = Arc::new(InventoryStore::new());
    let cache = CacheCoordinator::new(Arc::new(TtlCache::new()), Counters::new(), &config);
    AllocationEngine::new(store, cache, Arc::new(NoopNotifier))
}

fn new_lot(engine: &AllocationEngine, slots: u32, rate_cents: u64) -> u64 {
    engine
        .create_lot(LotSpec {
            location_name: "Central Garage".to_string(),
            rate_cents,
            address: "12 Main Road".to_string(),
            pincode: "560001".to_string(),
            total_slots: slots,
        })
        .unwrap()
        .id
}

fn new_user(engine: &AllocationEngine, name: &str) -> u64 {
    engine
        .create_user(UserSpec {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            role: Role::User,
            vehicle_number: None,
        })
        .unwrap()
        .id
}

fn caller(user_id: u64) -> Caller {
    Caller {
        user_id,
        role: Role::User,
    }
}

fn admin() -> Caller {
    Caller {
        user_id: 0,
        role: Role::Admin,
    }
}

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

// =============================================================================
// Allocate Tests
// =============================================================================

#[test]
fn allocate_takes_lowest_id_spot_and_decrements_counter() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 3, 1000);
    let user_id = new_user(&engine, "asha");

    let spots = engine.available_spots(lot_id).unwrap();
    let lowest = spots.first().unwrap().id;

    let res = engine.allocate(lot_id, user_id).unwrap();

    assert_eq!(res.spot_id, lowest);
    assert_eq!(res.user_id, user_id);
    assert!(res.end_time.is_none());
    assert_eq!(res.cost_cents, 0);

    let lot = engine.store().get_lot(lot_id).unwrap();
    assert_eq!(lot.available_slots, 2);

    let spot = engine.store().get_spot(lowest).unwrap();
    assert_eq!(spot.state, SpotState::Occupied);
    assert_eq!(spot.occupant_user_id, Some(user_id));

    engine.store().check_invariants().unwrap();
}

#[test]
fn allocate_unknown_lot_is_not_found() {
    let engine = setup_engine();
    let user_id = new_user(&engine, "asha");

    let err = engine.allocate(999, user_id).unwrap_err();
    assert!(matches!(err, ParkError::NotFound { entity: "lot", .. }));
}

#[test]
fn allocate_unknown_user_is_not_found() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);

    let err = engine.allocate(lot_id, 999).unwrap_err();
    assert!(matches!(err, ParkError::NotFound { entity: "user", .. }));
}

#[test]
fn allocate_twice_for_same_user_is_already_active() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 3, 1000);
    let user_id = new_user(&engine, "asha");

    let first = engine.allocate(lot_id, user_id).unwrap();
    let err = engine.allocate(lot_id, user_id).unwrap_err();

    match err {
        ParkError::AlreadyActive {
            user_id: blocked,
            reservation_id,
        } => {
            assert_eq!(blocked, user_id);
            assert_eq!(reservation_id, first.id);
        }
        other => panic!("expected AlreadyActive, got {other:?}"),
    }

    // The failed attempt must not have touched the counter
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 2);
}

#[test]
fn allocate_on_full_lot_is_no_capacity() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);
    let first = new_user(&engine, "asha");
    let second = new_user(&engine, "bilal");

    engine.allocate(lot_id, first).unwrap();
    let err = engine.allocate(lot_id, second).unwrap_err();

    assert!(matches!(err, ParkError::NoCapacity { lot_id: l } if l == lot_id));
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 0);
    engine.store().check_invariants().unwrap();
}

// =============================================================================
// Release Tests
// =============================================================================

#[test]
fn release_after_90_minutes_bills_two_hours_and_frees_the_spot() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 2, 1500);
    let user_id = new_user(&engine, "asha");

    let res = engine.allocate_at(lot_id, user_id, t0()).unwrap();
    let released = engine
        .release_at(
            res.id,
            caller(user_id),
            ReleaseOptions::default(),
            t0() + Duration::minutes(90),
        )
        .unwrap();

    assert_eq!(released.cost_cents, 2 * 1500);
    assert_eq!(released.end_time, Some(t0() + Duration::minutes(90)));

    let lot = engine.store().get_lot(lot_id).unwrap();
    assert_eq!(lot.available_slots, 2);

    let spot = engine.store().get_spot(res.spot_id).unwrap();
    assert_eq!(spot.state, SpotState::Available);
    assert_eq!(spot.occupant_user_id, None);

    engine.store().check_invariants().unwrap();
}

#[test]
fn release_twice_is_not_found_and_does_not_double_increment() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);
    let user_id = new_user(&engine, "asha");

    let res = engine.allocate_at(lot_id, user_id, t0()).unwrap();
    engine
        .release_at(
            res.id,
            caller(user_id),
            ReleaseOptions::default(),
            t0() + Duration::minutes(30),
        )
        .unwrap();

    let err = engine
        .release_at(
            res.id,
            caller(user_id),
            ReleaseOptions::default(),
            t0() + Duration::minutes(60),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        ParkError::NotFound {
            entity: "reservation",
            ..
        }
    ));
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 1);
    engine.store().check_invariants().unwrap();
}

#[test]
fn release_by_stranger_is_access_denied_but_admin_may_override() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 2, 1000);
    let owner = new_user(&engine, "asha");
    let stranger = new_user(&engine, "bilal");

    let res = engine.allocate_at(lot_id, owner, t0()).unwrap();

    let err = engine
        .release_at(
            res.id,
            caller(stranger),
            ReleaseOptions::default(),
            t0() + Duration::minutes(10),
        )
        .unwrap_err();
    assert!(matches!(err, ParkError::AccessDenied));

    // The denied attempt rolled back: still open, still occupied
    assert!(engine.store().get_reservation(res.id).unwrap().is_open());

    engine
        .release_at(
            res.id,
            admin(),
            ReleaseOptions::default(),
            t0() + Duration::minutes(10),
        )
        .unwrap();
    engine.store().check_invariants().unwrap();
}

#[test]
fn release_records_payment_details() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);
    let user_id = new_user(&engine, "asha");

    let res = engine.allocate_at(lot_id, user_id, t0()).unwrap();
    let released = engine
        .release_at(
            res.id,
            caller(user_id),
            ReleaseOptions {
                transaction_id: Some("TXN-42".to_string()),
                payment_method: Some("UPI".to_string()),
            },
            t0() + Duration::minutes(45),
        )
        .unwrap();

    assert_eq!(released.transaction_id.as_deref(), Some("TXN-42"));
    assert_eq!(released.payment_method.as_deref(), Some("UPI"));
    assert_eq!(released.cost_cents, 1000); // 45 min bills the one-hour floor
}

// =============================================================================
// Explicit-Interval Reservation Tests
// =============================================================================

#[test]
fn reserve_interval_prices_immediately_and_occupies_the_spot() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 2, 2000);
    let user_id = new_user(&engine, "asha");

    let spot_id = engine.available_spots(lot_id).unwrap()[0].id;
    let res = engine
        .reserve_interval(spot_id, user_id, t0(), t0() + Duration::minutes(150))
        .unwrap();

    // 150 minutes rounds up to 3 hours
    assert_eq!(res.cost_cents, 3 * 2000);
    assert_eq!(res.end_time, Some(t0() + Duration::minutes(150)));

    assert_eq!(
        engine.store().get_spot(spot_id).unwrap().state,
        SpotState::Occupied
    );
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 1);
    engine.store().check_invariants().unwrap();
}

#[test]
fn reserve_interval_on_taken_spot_is_not_available() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);
    let first = new_user(&engine, "asha");
    let second = new_user(&engine, "bilal");

    let res = engine.allocate_at(lot_id, first, t0()).unwrap();
    let err = engine
        .reserve_interval(res.spot_id, second, t0(), t0() + Duration::hours(1))
        .unwrap_err();

    assert!(matches!(err, ParkError::NotAvailable { spot_id } if spot_id == res.spot_id));
}

#[test]
fn reserve_interval_rejects_backwards_and_empty_intervals() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);
    let user_id = new_user(&engine, "asha");
    let spot_id = engine.available_spots(lot_id).unwrap()[0].id;

    let err = engine
        .reserve_interval(spot_id, user_id, t0(), t0() - Duration::minutes(1))
        .unwrap_err();
    assert!(matches!(err, ParkError::InvalidInterval));

    let err = engine
        .reserve_interval(spot_id, user_id, t0(), t0())
        .unwrap_err();
    assert!(matches!(err, ParkError::InvalidInterval));

    // Nothing was booked
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 1);
}

#[test]
fn future_interval_reservation_blocks_open_ended_allocation() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 2, 1000);
    let user_id = new_user(&engine, "asha");
    let spot_id = engine.available_spots(lot_id).unwrap()[0].id;

    let booked = engine
        .reserve_interval(
            spot_id,
            user_id,
            t0() + Duration::hours(2),
            t0() + Duration::hours(4),
        )
        .unwrap();

    // While the interval has not ended, the user counts as active
    let err = engine.allocate_at(lot_id, user_id, t0()).unwrap_err();
    assert!(matches!(err, ParkError::AlreadyActive { reservation_id, .. } if reservation_id == booked.id));

    // Once the interval has passed, the user may book again
    engine
        .allocate_at(lot_id, user_id, t0() + Duration::hours(5))
        .unwrap();
}

#[test]
fn ended_interval_booking_is_cancellable_and_returns_the_spot() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);
    let user_id = new_user(&engine, "asha");
    let spot_id = engine.available_spots(lot_id).unwrap()[0].id;

    let res = engine
        .reserve_interval(spot_id, user_id, t0(), t0() + Duration::hours(1))
        .unwrap();

    // The pre-closed row is not releasable, so cancel must stay open as the
    // way to get the spot back after the interval ends
    let err = engine
        .release_at(
            res.id,
            caller(user_id),
            ReleaseOptions::default(),
            t0() + Duration::hours(2),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ParkError::NotFound {
            entity: "reservation",
            ..
        }
    ));

    engine
        .cancel_at(res.id, caller(user_id), t0() + Duration::hours(2))
        .unwrap();

    assert_eq!(
        engine.store().get_spot(spot_id).unwrap().state,
        SpotState::Available
    );
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 1);
    engine.store().check_invariants().unwrap();

    // The reclaimed slot is allocatable again
    let other = new_user(&engine, "bilal");
    engine
        .allocate_at(lot_id, other, t0() + Duration::hours(3))
        .unwrap();
}

#[test]
fn reclaim_frees_ended_interval_bookings_but_keeps_the_paid_rows() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 2, 1000);
    let user_id = new_user(&engine, "asha");
    let spot_id = engine.available_spots(lot_id).unwrap()[0].id;

    let res = engine
        .reserve_interval(spot_id, user_id, t0(), t0() + Duration::hours(1))
        .unwrap();

    // Still inside the interval: nothing to reclaim yet
    assert_eq!(
        engine.reclaim_expired_at(t0() + Duration::minutes(30)).unwrap(),
        0
    );
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 1);

    assert_eq!(
        engine.reclaim_expired_at(t0() + Duration::hours(2)).unwrap(),
        1
    );
    assert_eq!(
        engine.store().get_spot(spot_id).unwrap().state,
        SpotState::Available
    );
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 2);

    // History survives with its charge intact
    let kept = engine.store().get_reservation(res.id).unwrap();
    assert_eq!(kept.cost_cents, 1000);
    engine.store().check_invariants().unwrap();

    // The same user may book again, and the reclaimed spot is eligible
    let again = engine
        .allocate_at(lot_id, user_id, t0() + Duration::hours(2))
        .unwrap();
    assert_eq!(again.spot_id, spot_id);
}

#[test]
fn reclaim_never_touches_open_stays() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);
    let user_id = new_user(&engine, "asha");

    engine.allocate_at(lot_id, user_id, t0()).unwrap();
    assert_eq!(
        engine.reclaim_expired_at(t0() + Duration::hours(48)).unwrap(),
        0
    );
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 0);
    engine.store().check_invariants().unwrap();
}

// =============================================================================
// Cancel Tests
// =============================================================================

#[test]
fn cancel_removes_the_row_and_reverts_spot_and_counter() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 2, 1000);
    let user_id = new_user(&engine, "asha");

    let res = engine.allocate_at(lot_id, user_id, t0()).unwrap();
    engine
        .cancel_at(res.id, caller(user_id), t0() + Duration::minutes(5))
        .unwrap();

    let err = engine.store().get_reservation(res.id).unwrap_err();
    assert!(matches!(
        err,
        ParkError::NotFound {
            entity: "reservation",
            ..
        }
    ));

    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 2);
    assert_eq!(
        engine.store().get_spot(res.spot_id).unwrap().state,
        SpotState::Available
    );
    engine.store().check_invariants().unwrap();
}

#[test]
fn cancel_completed_reservation_is_a_conflict() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);
    let user_id = new_user(&engine, "asha");

    let res = engine.allocate_at(lot_id, user_id, t0()).unwrap();
    engine
        .release_at(
            res.id,
            caller(user_id),
            ReleaseOptions::default(),
            t0() + Duration::minutes(30),
        )
        .unwrap();

    let err = engine
        .cancel_at(res.id, caller(user_id), t0() + Duration::hours(1))
        .unwrap_err();
    assert!(matches!(err, ParkError::Conflict(_)));

    // History survives a refused cancel
    engine.store().get_reservation(res.id).unwrap();
}

#[test]
fn cancel_by_stranger_is_access_denied() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 1, 1000);
    let owner = new_user(&engine, "asha");
    let stranger = new_user(&engine, "bilal");

    let res = engine.allocate_at(lot_id, owner, t0()).unwrap();
    let err = engine.cancel(res.id, caller(stranger)).unwrap_err();
    assert!(matches!(err, ParkError::AccessDenied));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn concurrent_allocations_on_one_slot_admit_exactly_one() {
    let config = Config::default();
    let store = Arc::new(InventoryStore::new());
    let cache = CacheCoordinator::new(Arc::new(TtlCache::new()), Counters::new(), &config);
    let engine = Arc::new(AllocationEngine::new(store, cache, Arc::new(NoopNotifier)));

    let lot_id = new_lot(&engine, 1, 1000);
    let users: Vec<u64> = (0..8)
        .map(|i| new_user(&engine, &format!("user{i}")))
        .collect();

    let mut handles = Vec::new();
    for user_id in users {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || engine.allocate(lot_id, user_id)));
    }

    let mut successes = 0;
    let mut refusals = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => successes += 1,
            Err(ParkError::NoCapacity { .. }) => refusals += 1,
            Err(other) => panic!("unexpected error under contention: {other:?}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(refusals, 7);
    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 0);
    engine.store().check_invariants().unwrap();
}

#[test]
fn concurrent_cycles_keep_the_counter_consistent() {
    let config = Config::default();
    let store = Arc::new(InventoryStore::new());
    let cache = CacheCoordinator::new(Arc::new(TtlCache::new()), Counters::new(), &config);
    let engine = Arc::new(AllocationEngine::new(store, cache, Arc::new(NoopNotifier)));

    let lot_id = new_lot(&engine, 4, 1000);
    let users: Vec<u64> = (0..8)
        .map(|i| new_user(&engine, &format!("user{i}")))
        .collect();

    let mut handles = Vec::new();
    for user_id in users {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let me = Caller {
                user_id,
                role: Role::User,
            };
            for _ in 0..25 {
                match engine.allocate(lot_id, user_id) {
                    Ok(res) => {
                        engine.release(res.id, me, ReleaseOptions::default()).unwrap();
                    }
                    Err(ParkError::NoCapacity { .. }) => thread::yield_now(),
                    Err(other) => panic!("unexpected error under contention: {other:?}"),
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.store().get_lot(lot_id).unwrap().available_slots, 4);
    engine.store().check_invariants().unwrap();
}

// =============================================================================
// Observability Tests
// =============================================================================

#[test]
fn counters_track_reservations_and_releases() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 2, 1000);
    let user_id = new_user(&engine, "asha");

    let res = engine.allocate_at(lot_id, user_id, t0()).unwrap();
    engine
        .release_at(
            res.id,
            caller(user_id),
            ReleaseOptions::default(),
            t0() + Duration::minutes(10),
        )
        .unwrap();

    assert_eq!(engine.counters().read(TOTAL_RESERVATIONS), 1);
    assert_eq!(engine.counters().read(RESERVATIONS_TODAY), 1);
    assert_eq!(engine.counters().read(RELEASES_COMPLETED), 1);
}

#[test]
fn notifications_fire_after_allocate_and_release() {
    let config = Config::default();
    let store = Arc::new(InventoryStore::new());
    let cache = CacheCoordinator::new(Arc::new(TtlCache::new()), Counters::new(), &config);
    let (notifier, rx) = ChannelNotifier::new();
    let engine = AllocationEngine::new(store, cache, Arc::new(notifier));

    let lot_id = new_lot(&engine, 1, 1000);
    let user_id = new_user(&engine, "asha");

    let res = engine.allocate_at(lot_id, user_id, t0()).unwrap();
    engine
        .release_at(
            res.id,
            caller(user_id),
            ReleaseOptions::default(),
            t0() + Duration::minutes(10),
        )
        .unwrap();

    assert_eq!(
        rx.try_recv().unwrap(),
        Notification::Booked {
            reservation_id: res.id
        }
    );
    assert_eq!(
        rx.try_recv().unwrap(),
        Notification::Released {
            reservation_id: res.id
        }
    );
}

#[test]
fn reservation_history_is_owner_gated_and_newest_first() {
    let engine = setup_engine();
    let lot_id = new_lot(&engine, 2, 1000);
    let user_id = new_user(&engine, "asha");
    let stranger = new_user(&engine, "bilal");

    let first = engine.allocate_at(lot_id, user_id, t0()).unwrap();
    engine
        .release_at(
            first.id,
            caller(user_id),
            ReleaseOptions::default(),
            t0() + Duration::minutes(10),
        )
        .unwrap();
    let second = engine
        .allocate_at(lot_id, user_id, t0() + Duration::hours(1))
        .unwrap();

    let history = engine.user_reservations(user_id, caller(user_id)).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].id, first.id);

    let err = engine.user_reservations(user_id, caller(stranger)).unwrap_err();
    assert!(matches!(err, ParkError::AccessDenied));

    engine.user_reservations(user_id, admin()).unwrap();
}
