// tests/unit_stampede_test.rs

//! Contention tests against the real clock: a fleet of tasks racing on one
//! key must produce exactly one compute per epoch.

use bytes::Bytes;
use herdguard::CacheCoordinator;
use herdguard::core::coordinator::FetchOptions;
use herdguard::core::memory::InMemoryMemcache;
use herdguard::core::wait::Wait;
use herdguard::core::{HerdGuardError, MemcacheClient};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_producer_under_contention() {
    let client: InMemoryMemcache<String> = InMemoryMemcache::new();
    let coordinator = Arc::new(CacheCoordinator::new(client.clone()));
    let computes = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = coordinator.clone();
        let computes = computes.clone();
        handles.push(tokio::spawn(async move {
            let compute = {
                let computes = computes.clone();
                move || {
                    let computes = computes.clone();
                    async move {
                        computes.fetch_add(1, Ordering::SeqCst);
                        // A deliberately slow origin.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, HerdGuardError>("V".to_string())
                    }
                }
            };
            coordinator
                .get_or_compute_with(
                    "contended",
                    60.0,
                    compute,
                    FetchOptions::default().wait(Wait::Sleep(Some(0.2))),
                )
                .await
        }));
    }

    let mut hits = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Some(value) => {
                assert_eq!(value, "V");
                hits += 1;
            }
            // A loser whose retry still found the lock held gives up.
            None => {}
        }
    }

    // Exactly one caller won the add and computed; everyone else either hit
    // the fresh value on retry or gave up.
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    assert!(hits >= 1);

    let envelope = client.peek(&Bytes::from_static(b"contended")).unwrap();
    assert_eq!(envelope.value.as_deref(), Some("V"));
    assert!(!envelope.processing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stale_refresh_computes_once() {
    let client: InMemoryMemcache<String> = InMemoryMemcache::new();
    let coordinator = Arc::new(CacheCoordinator::new(client.clone()));
    let key = Bytes::from_static(b"warm");

    // Seed an already-stale value with enough store TTL left to serve.
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64();
    client
        .set(
            &key,
            &herdguard::core::Envelope::fresh(now - 1.0, "old".to_string()),
            30,
        )
        .await
        .unwrap();

    let computes = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();
    for _ in 0..6 {
        let coordinator = coordinator.clone();
        let computes = computes.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            let compute = {
                let computes = computes.clone();
                move || {
                    let computes = computes.clone();
                    async move {
                        computes.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok::<_, HerdGuardError>("new".to_string())
                    }
                }
            };
            coordinator
                .get_or_compute_with(
                    key,
                    60.0,
                    compute,
                    FetchOptions::default().wait(Wait::Sleep(Some(0.2))),
                )
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        // Every caller resolves: the winner computes, the rest hit either
        // the fresh value after waiting or gave up on a held lock.
        if let Some(value) = result {
            assert!(value == "new" || value == "old");
        }
    }
    assert_eq!(computes.load(Ordering::SeqCst), 1);
}
