//! Benchmarks for Lotkeeper engine operations

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use lotkeeper::cache::{CacheCoordinator, TtlCache};
use lotkeeper::metrics::Counters;
use lotkeeper::notify::NoopNotifier;
use lotkeeper::{
    AllocationEngine, Caller, Config, InventoryStore, LotSpec, ReleaseOptions, Role, UserSpec,
};

fn setup_engine() -> (AllocationEngine, u64, u64) {
    let config = Config::default();
    let store = Arc::new(InventoryStore::new());
    let cache = CacheCoordinator::new(Arc::new(TtlCache::new()), Counters::new(), &config);
    let engine = AllocationEngine::new(store, cache, Arc::new(NoopNotifier));

    let lot = engine
        .create_lot(LotSpec {
            location_name: "Bench Lot".to_string(),
            rate_cents: 1000,
            address: "1 Bench Way".to_string(),
            pincode: "00000".to_string(),
            total_slots: 64,
        })
        .unwrap();
    let user = engine
        .create_user(UserSpec {
            username: "bench".to_string(),
            email: "bench@example.com".to_string(),
            role: Role::User,
            vehicle_number: None,
        })
        .unwrap();
    (engine, lot.id, user.id)
}

fn engine_benchmarks(c: &mut Criterion) {
    let (engine, lot_id, user_id) = setup_engine();
    let caller = Caller {
        user_id,
        role: Role::User,
    };

    c.bench_function("allocate_release_cycle", |b| {
        b.iter(|| {
            let res = engine.allocate(lot_id, user_id).unwrap();
            engine
                .release(res.id, caller, ReleaseOptions::default())
                .unwrap();
        });
    });

    c.bench_function("lot_view_cached", |b| {
        // Prime the cache once; subsequent reads hit until the TTL lapses
        let _ = engine.lot_view(lot_id).unwrap();
        b.iter(|| engine.lot_view(lot_id).unwrap());
    });
}

criterion_group!(benches, engine_benchmarks);
criterion_main!(benches);
