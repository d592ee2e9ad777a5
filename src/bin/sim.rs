//! Lotkeeper Simulation Binary
//!
//! Drives a concurrent allocate/release workload against an in-process
//! engine, then audits the inventory invariants. Useful as a smoke test for
//! the locking model and as a demo of the public API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use lotkeeper::cache::{CacheCoordinator, TtlCache};
use lotkeeper::metrics::Counters;
use lotkeeper::notify::ChannelNotifier;
use lotkeeper::{
    AllocationEngine, Caller, Config, InventoryStore, LotSpec, ParkError, ReleaseOptions, Role,
    UserSpec,
};

/// Lotkeeper workload simulator
#[derive(Parser, Debug)]
#[command(name = "lotkeeper-sim")]
#[command(about = "Concurrent workload driver for the Lotkeeper engine")]
#[command(version)]
struct Args {
    /// Number of lots to create
    #[arg(long, default_value = "4")]
    lots: u32,

    /// Slots per lot
    #[arg(long, default_value = "8")]
    slots: u32,

    /// Number of concurrent users
    #[arg(long, default_value = "32")]
    users: u32,

    /// Allocate/release rounds per user
    #[arg(long, default_value = "50")]
    rounds: u32,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lotkeeper=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    tracing::info!("Lotkeeper sim v{}", lotkeeper::VERSION);

    let config = Config::default();
    let store = Arc::new(InventoryStore::new());
    let counters = Counters::new();
    let cache = CacheCoordinator::new(Arc::new(TtlCache::new()), counters.clone(), &config);
    let (notifier, notifications) = ChannelNotifier::new();
    let engine = Arc::new(AllocationEngine::new(store, cache, Arc::new(notifier)));

    // Drain notifications the way an out-of-process consumer would
    let consumer = thread::spawn(move || {
        let mut delivered = 0u64;
        while notifications.recv().is_ok() {
            delivered += 1;
        }
        delivered
    });

    // Seed inventory
    let mut lot_ids = Vec::new();
    for i in 0..args.lots {
        let lot = engine
            .create_lot(LotSpec {
                location_name: format!("Lot {i}"),
                rate_cents: 1500,
                address: format!("{i} Demo Street"),
                pincode: "560001".to_string(),
                total_slots: args.slots,
            })
            .expect("lot creation");
        lot_ids.push(lot.id);
    }

    let mut user_ids = Vec::new();
    for i in 0..args.users {
        let user = engine
            .create_user(UserSpec {
                username: format!("driver{i}"),
                email: format!("driver{i}@example.com"),
                role: Role::User,
                vehicle_number: None,
            })
            .expect("user creation");
        user_ids.push(user.id);
    }

    let refused = Arc::new(AtomicU64::new(0));
    let completed = Arc::new(AtomicU64::new(0));

    // Workload: each user hammers a home lot, occasionally peeking at the
    // cached lot list the way a display endpoint would
    let mut handles = Vec::new();
    for (idx, user_id) in user_ids.iter().copied().enumerate() {
        let engine = Arc::clone(&engine);
        let lot_id = lot_ids[idx % lot_ids.len()];
        let refused = Arc::clone(&refused);
        let completed = Arc::clone(&completed);
        let rounds = args.rounds;

        handles.push(thread::spawn(move || {
            let caller = Caller {
                user_id,
                role: Role::User,
            };
            for round in 0..rounds {
                match engine.allocate(lot_id, user_id) {
                    Ok(res) => {
                        if round % 5 == 0 {
                            let _ = engine.lots_view();
                        }
                        engine
                            .release(res.id, caller, ReleaseOptions::default())
                            .expect("release of own open reservation");
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(ParkError::NoCapacity { .. }) => {
                        refused.fetch_add(1, Ordering::Relaxed);
                        thread::yield_now();
                    }
                    Err(e) => panic!("unexpected allocation failure: {e}"),
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("worker thread");
    }

    // Every spot must be free again and every counter must match its rows
    match engine.store().check_invariants() {
        Ok(()) => tracing::info!("invariant audit passed"),
        Err(e) => {
            tracing::error!("invariant audit FAILED: {e}");
            std::process::exit(1);
        }
    }

    drop(engine);
    let delivered = consumer.join().expect("notification consumer");

    tracing::info!(
        completed = completed.load(Ordering::Relaxed),
        refused = refused.load(Ordering::Relaxed),
        notifications = delivered,
        "workload finished"
    );
    for (name, value) in counters.snapshot() {
        tracing::info!("counter {name} = {value}");
    }
}
