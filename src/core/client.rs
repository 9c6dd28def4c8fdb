// src/core/client.rs

//! The Memcached client contract consumed by the coordinators.
//!
//! Regardless of the wire client or async runtime in use, implementations
//! expose the same six primitive operations and five batch variants, all in
//! terms of [`Envelope`] values. The trait deliberately binds to no specific
//! client; adapters wrap their own connection layer and codec.

use crate::core::HerdGuardError;
use crate::core::envelope::Envelope;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// The opaque per-read token anchoring an optimistic `cas` replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CasToken(pub u64);

/// One staged operation for a `cas_multi` batch.
#[derive(Debug, Clone)]
pub struct CasEntry<V> {
    pub key: Bytes,
    pub token: CasToken,
    pub envelope: Envelope<V>,
    pub ttl: u32,
}

/// One staged operation for a `set_multi` batch. TTLs are per key because
/// each key carries its own expiration.
#[derive(Debug, Clone)]
pub struct SetEntry<V> {
    pub key: Bytes,
    pub envelope: Envelope<V>,
    pub ttl: u32,
}

/// An async interface to a Memcached cluster, scoped to exactly what the
/// coordination protocol needs.
///
/// `add` must be atomic-insert-iff-absent and `cas` atomic
/// compare-and-replace; the protocol's single-producer guarantee rests on
/// those two primitives. Batched reads return only the keys that were found;
/// batched writes report per-key success keyed by the original key.
///
/// Transport and codec failures surface as
/// [`HerdGuardError::Transport`] / [`HerdGuardError::Serialization`] and pass
/// through the coordinators unchanged.
#[async_trait]
pub trait MemcacheClient: Send + Sync {
    /// The cached payload type, opaque to the protocol.
    type Value: Clone + Send + Sync + 'static;

    /// Returns the envelope stored under `key`, or `None` on a miss.
    async fn get(&self, key: &Bytes) -> Result<Option<Envelope<Self::Value>>, HerdGuardError>;

    /// Like `get`, but also returns the CAS token for the read.
    async fn gets(
        &self,
        key: &Bytes,
    ) -> Result<Option<(CasToken, Envelope<Self::Value>)>, HerdGuardError>;

    /// Atomic insert iff the key is absent. Returns whether the insert won.
    async fn add(
        &self,
        key: &Bytes,
        envelope: &Envelope<Self::Value>,
        ttl: u32,
    ) -> Result<bool, HerdGuardError>;

    /// Atomic replace iff the key still carries `token`. Returns whether the
    /// replace won.
    async fn cas(
        &self,
        key: &Bytes,
        token: CasToken,
        envelope: &Envelope<Self::Value>,
        ttl: u32,
    ) -> Result<bool, HerdGuardError>;

    /// Unconditional write.
    async fn set(
        &self,
        key: &Bytes,
        envelope: &Envelope<Self::Value>,
        ttl: u32,
    ) -> Result<(), HerdGuardError>;

    /// Batched `get`. Missing keys are absent from the result map.
    async fn get_multi(
        &self,
        keys: &[Bytes],
    ) -> Result<HashMap<Bytes, Envelope<Self::Value>>, HerdGuardError>;

    /// Batched `gets`.
    async fn gets_multi(
        &self,
        keys: &[Bytes],
    ) -> Result<HashMap<Bytes, (CasToken, Envelope<Self::Value>)>, HerdGuardError>;

    /// Batched `add` of the given envelopes, all with the same TTL.
    async fn add_multi(
        &self,
        entries: &[(Bytes, Envelope<Self::Value>)],
        ttl: u32,
    ) -> Result<HashMap<Bytes, bool>, HerdGuardError>;

    /// Batched `cas` of independently staged operations.
    async fn cas_multi(
        &self,
        entries: &[CasEntry<Self::Value>],
    ) -> Result<HashMap<Bytes, bool>, HerdGuardError>;

    /// Batched unconditional write with per-key TTLs.
    async fn set_multi(&self, entries: &[SetEntry<Self::Value>]) -> Result<(), HerdGuardError>;
}
