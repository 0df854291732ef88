//! Benchmarks for the `MemoryStore` adapter in isolation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pacer_rs::{MemoryStore, Policy, Rate, Store};
use tokio::runtime::Runtime;

fn policy() -> Policy {
    Policy::single(Rate::new(1000, "1s", 100).unwrap(), "ip", "bench").unwrap()
}

fn bench_ping(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = rt.enter();
    let store = MemoryStore::new();

    c.bench_function("storage/ping", |b| {
        b.iter(|| rt.block_on(async { black_box(store.ping().await) }))
    });
}

fn bench_hot_key(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = rt.enter();
    let store = MemoryStore::new();
    let policy = policy();

    c.bench_function("storage/hot_key", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let keys = vec!["hotkey:shared".to_string()];
            rt.block_on(async {
                black_box(store.check_policy(&keys, &policy, 1_700_000_000_000 + i).await)
            })
        })
    });
}

fn bench_distributed_keys(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let policy = policy();

    let mut group = c.benchmark_group("storage/distributed_keys");
    for num_keys in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("entries", num_keys), num_keys, |b, &num_keys| {
            let _guard = rt.enter();
            let store = MemoryStore::new();
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                let keys = vec![format!("dist:{}", i % num_keys)];
                rt.block_on(async {
                    black_box(store.check_policy(&keys, &policy, 1_700_000_000_000 + i).await)
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ping, bench_hot_key, bench_distributed_keys);
criterion_main!(benches);
