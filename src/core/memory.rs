// src/core/memory.rs

//! An in-process Memcached model implementing the client contract.
//!
//! Entries live in a single map guarded by a mutex, each carrying its
//! envelope, a per-entry CAS version, and an expiry deadline against the
//! injected clock. Expiry is lazy: a dead entry is dropped by whichever
//! operation touches it next. Per-operation call counters let tests assert
//! round-trip bounds.

use crate::core::HerdGuardError;
use crate::core::client::{CasEntry, CasToken, MemcacheClient, SetEntry};
use crate::core::clock::{Clock, SystemClock};
use crate::core::envelope::Envelope;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

struct Entry<V> {
    envelope: Envelope<V>,
    version: u64,
    /// Unix-seconds deadline; `None` never expires.
    expires_at: Option<f64>,
}

/// Call counts per client operation, as observed since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub get: u64,
    pub gets: u64,
    pub add: u64,
    pub cas: u64,
    pub set: u64,
    pub get_multi: u64,
    pub gets_multi: u64,
    pub add_multi: u64,
    pub cas_multi: u64,
    pub set_multi: u64,
}

/// An in-memory [`MemcacheClient`] for tests, benches, and local
/// development. Cheap to share: clones refer to the same store.
pub struct InMemoryMemcache<V> {
    inner: Arc<Shared<V>>,
}

struct Shared<V> {
    clock: Arc<dyn Clock>,
    store: Mutex<HashMap<Bytes, Entry<V>>>,
    next_version: AtomicU64,
    counts: Mutex<OpCounts>,
}

impl<V> Clone for InMemoryMemcache<V> {
    fn clone(&self) -> Self {
        InMemoryMemcache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Default for InMemoryMemcache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> InMemoryMemcache<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryMemcache {
            inner: Arc::new(Shared {
                clock,
                store: Mutex::new(HashMap::new()),
                next_version: AtomicU64::new(1),
                counts: Mutex::new(OpCounts::default()),
            }),
        }
    }

    /// Snapshot of the per-operation call counters.
    pub fn op_counts(&self) -> OpCounts {
        *self.inner.counts.lock()
    }

    /// Reads an envelope without bumping any counter. Test helper.
    pub fn peek(&self, key: &Bytes) -> Option<Envelope<V>> {
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        live_entry(&mut store, key, now).map(|entry| entry.envelope.clone())
    }

    pub fn flush(&self) {
        self.inner.store.lock().clear();
    }

    fn bump(&self, op: impl FnOnce(&mut OpCounts) -> &mut u64) {
        *op(&mut self.inner.counts.lock()) += 1;
    }

    fn version(&self) -> u64 {
        self.inner.next_version.fetch_add(1, Ordering::Relaxed)
    }

    fn deadline(&self, ttl: u32, now: f64) -> Option<f64> {
        // Memcached treats a zero TTL as "never expires".
        (ttl > 0).then(|| now + f64::from(ttl))
    }

    fn insert(&self, store: &mut HashMap<Bytes, Entry<V>>, key: Bytes, envelope: Envelope<V>, ttl: u32, now: f64) {
        store.insert(
            key,
            Entry {
                envelope,
                version: self.version(),
                expires_at: self.deadline(ttl, now),
            },
        );
    }

    fn try_add(
        &self,
        store: &mut HashMap<Bytes, Entry<V>>,
        key: &Bytes,
        envelope: &Envelope<V>,
        ttl: u32,
        now: f64,
    ) -> bool {
        if live_entry(store, key, now).is_some() {
            return false;
        }
        self.insert(store, key.clone(), envelope.clone(), ttl, now);
        true
    }

    fn try_cas(
        &self,
        store: &mut HashMap<Bytes, Entry<V>>,
        key: &Bytes,
        token: CasToken,
        envelope: &Envelope<V>,
        ttl: u32,
        now: f64,
    ) -> bool {
        let token_matches =
            live_entry(store, key, now).is_some_and(|entry| entry.version == token.0);
        if token_matches {
            self.insert(store, key.clone(), envelope.clone(), ttl, now);
        }
        token_matches
    }
}

/// Returns the entry under `key` if it has not passed its deadline, dropping
/// it otherwise.
fn live_entry<'a, V>(
    store: &'a mut HashMap<Bytes, Entry<V>>,
    key: &Bytes,
    now: f64,
) -> Option<&'a Entry<V>> {
    let dead = store
        .get(key)
        .is_some_and(|entry| entry.expires_at.is_some_and(|deadline| deadline <= now));
    if dead {
        store.remove(key);
        return None;
    }
    store.get(key)
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> MemcacheClient for InMemoryMemcache<V> {
    type Value = V;

    async fn get(&self, key: &Bytes) -> Result<Option<Envelope<V>>, HerdGuardError> {
        self.bump(|c| &mut c.get);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        Ok(live_entry(&mut store, key, now).map(|entry| entry.envelope.clone()))
    }

    async fn gets(&self, key: &Bytes) -> Result<Option<(CasToken, Envelope<V>)>, HerdGuardError> {
        self.bump(|c| &mut c.gets);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        Ok(live_entry(&mut store, key, now)
            .map(|entry| (CasToken(entry.version), entry.envelope.clone())))
    }

    async fn add(
        &self,
        key: &Bytes,
        envelope: &Envelope<V>,
        ttl: u32,
    ) -> Result<bool, HerdGuardError> {
        self.bump(|c| &mut c.add);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        Ok(self.try_add(&mut store, key, envelope, ttl, now))
    }

    async fn cas(
        &self,
        key: &Bytes,
        token: CasToken,
        envelope: &Envelope<V>,
        ttl: u32,
    ) -> Result<bool, HerdGuardError> {
        self.bump(|c| &mut c.cas);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        Ok(self.try_cas(&mut store, key, token, envelope, ttl, now))
    }

    async fn set(
        &self,
        key: &Bytes,
        envelope: &Envelope<V>,
        ttl: u32,
    ) -> Result<(), HerdGuardError> {
        self.bump(|c| &mut c.set);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        self.insert(&mut store, key.clone(), envelope.clone(), ttl, now);
        Ok(())
    }

    async fn get_multi(
        &self,
        keys: &[Bytes],
    ) -> Result<HashMap<Bytes, Envelope<V>>, HerdGuardError> {
        self.bump(|c| &mut c.get_multi);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        let mut found = HashMap::new();
        for key in keys {
            if let Some(entry) = live_entry(&mut store, key, now) {
                found.insert(key.clone(), entry.envelope.clone());
            }
        }
        Ok(found)
    }

    async fn gets_multi(
        &self,
        keys: &[Bytes],
    ) -> Result<HashMap<Bytes, (CasToken, Envelope<V>)>, HerdGuardError> {
        self.bump(|c| &mut c.gets_multi);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        let mut found = HashMap::new();
        for key in keys {
            if let Some(entry) = live_entry(&mut store, key, now) {
                found.insert(
                    key.clone(),
                    (CasToken(entry.version), entry.envelope.clone()),
                );
            }
        }
        Ok(found)
    }

    async fn add_multi(
        &self,
        entries: &[(Bytes, Envelope<V>)],
        ttl: u32,
    ) -> Result<HashMap<Bytes, bool>, HerdGuardError> {
        self.bump(|c| &mut c.add_multi);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        Ok(entries
            .iter()
            .map(|(key, envelope)| {
                (
                    key.clone(),
                    self.try_add(&mut store, key, envelope, ttl, now),
                )
            })
            .collect())
    }

    async fn cas_multi(
        &self,
        entries: &[CasEntry<V>],
    ) -> Result<HashMap<Bytes, bool>, HerdGuardError> {
        self.bump(|c| &mut c.cas_multi);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        Ok(entries
            .iter()
            .map(|entry| {
                (
                    entry.key.clone(),
                    self.try_cas(
                        &mut store,
                        &entry.key,
                        entry.token,
                        &entry.envelope,
                        entry.ttl,
                        now,
                    ),
                )
            })
            .collect())
    }

    async fn set_multi(&self, entries: &[SetEntry<V>]) -> Result<(), HerdGuardError> {
        self.bump(|c| &mut c.set_multi);
        let now = self.inner.clock.now();
        let mut store = self.inner.store.lock();
        for entry in entries {
            self.insert(
                &mut store,
                entry.key.clone(),
                entry.envelope.clone(),
                entry.ttl,
                now,
            );
        }
        Ok(())
    }
}
