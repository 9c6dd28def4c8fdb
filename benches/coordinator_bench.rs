// benches/coordinator_bench.rs

//! Coordinator benchmarks
//!
//! Measures the hot paths of the coordination protocol against the in-memory
//! client model: single-key fresh hits and batched multi-key classification.

use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use herdguard::CacheCoordinator;
use herdguard::core::HerdGuardError;
use herdguard::core::memory::InMemoryMemcache;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

fn bench_single_key_hit(c: &mut Criterion) {
    // Honor RUST_LOG during bench runs; ignore the error if already set up.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let rt = Runtime::new().unwrap();
    let client: InMemoryMemcache<String> = InMemoryMemcache::new();
    let coordinator = CacheCoordinator::new(client.clone());

    // Seed once; every benched call is a fresh hit.
    rt.block_on(async {
        coordinator
            .get_or_compute("bench-key", 3_600.0, || async {
                Ok::<_, HerdGuardError>("payload".to_string())
            })
            .await
            .unwrap();
    });

    c.bench_function("single_key_fresh_hit", |b| {
        b.to_async(&rt).iter(|| async {
            coordinator
                .get_or_compute("bench-key", 3_600.0, || async {
                    Ok::<_, HerdGuardError>("payload".to_string())
                })
                .await
                .unwrap()
        })
    });
}

fn bench_multi_key_hits(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client: InMemoryMemcache<String> = InMemoryMemcache::new();
    let coordinator = CacheCoordinator::new(client.clone());
    let keys: Vec<(Bytes, f64)> = (0..64)
        .map(|i| (Bytes::from(format!("bench-{i}")), 3_600.0))
        .collect();

    let compute = |batch: Vec<Bytes>| async move {
        Ok::<_, HerdGuardError>(
            batch
                .iter()
                .map(|key| String::from_utf8_lossy(key).into_owned())
                .collect::<Vec<String>>(),
        )
    };

    rt.block_on(async {
        coordinator.get_or_compute_many(&keys, compute).await.unwrap();
    });

    c.bench_function("multi_key_fresh_hits_64", |b| {
        b.to_async(&rt)
            .iter(|| async { coordinator.get_or_compute_many(&keys, compute).await.unwrap() })
    });
}

fn bench_cold_insert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client: InMemoryMemcache<String> = InMemoryMemcache::new();
    let coordinator = CacheCoordinator::new(client.clone());

    c.bench_function("single_key_cold_insert", |b| {
        b.to_async(&rt).iter(|| async {
            client.flush();
            coordinator
                .get_or_compute("cold-key", 3_600.0, || async {
                    Ok::<_, HerdGuardError>("payload".to_string())
                })
                .await
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_single_key_hit,
    bench_multi_key_hits,
    bench_cold_insert
);
criterion_main!(benches);
