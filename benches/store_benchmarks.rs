use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use tempfile::TempDir;

use ton_watcher::database::CursorStore;
use ton_watcher::registry::ExpiringRegistry;

const WALLET: &str = "EQDtFpEwcFAEcRe5mLVh2N6C0x-_hJEM7W61_JLnSF74p4q2";

fn bench_cursor_writes(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("bench_cursor.db");
    let store = CursorStore::new(db_path.to_str().unwrap()).expect("Failed to create store");

    let mut group = c.benchmark_group("cursor");
    let mut seqno = 0u32;

    group.bench_function("set_last_seqno", |b| {
        b.iter(|| {
            seqno += 1;
            store.set_last_seqno(black_box(seqno)).expect("Failed to persist seqno");
        });
    });

    group.bench_function("get_last_seqno", |b| {
        b.iter(|| {
            let _ = store.get_last_seqno();
        });
    });

    group.bench_function("set_last_logical_time", |b| {
        let mut lt = 0u64;
        b.iter(|| {
            lt += 1;
            store.set_last_logical_time(WALLET, black_box(lt)).expect("Failed to persist lt");
        });
    });

    group.finish();
}

fn bench_pending_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_rows");

    for size in [10, 100, 1000].iter() {
        let store = CursorStore::new_in_memory().expect("Failed to create store");
        for i in 0..*size {
            store
                .record_transaction(WALLET, 1_000_000_000, &format!("order-{}", i), Some(Duration::from_secs(600)))
                .expect("Failed to record row");
        }

        group.bench_with_input(BenchmarkId::new("list_transactions", size), size, |b, _| {
            b.iter(|| {
                let _ = store.list_transactions(black_box(WALLET));
            });
        });
    }

    group.bench_function("record_and_remove", |b| {
        let store = CursorStore::new_in_memory().expect("Failed to create store");
        b.iter(|| {
            store
                .record_transaction(WALLET, 1, "order", None)
                .expect("Failed to record row");
            store.remove_transaction(WALLET, "order").expect("Failed to remove row");
        });
    });

    group.finish();
}

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");
    let registry = ExpiringRegistry::new();
    for i in 0..10_000u64 {
        registry.set(i, i, Some(Duration::from_secs(600)));
    }

    group.bench_function("get", |b| {
        b.iter(|| {
            let _ = registry.get(black_box(&5_000));
        });
    });

    group.bench_function("sweep_live", |b| {
        b.iter(|| registry.sweep());
    });

    group.finish();
}

criterion_group!(benches, bench_cursor_writes, bench_pending_rows, bench_registry);
criterion_main!(benches);
