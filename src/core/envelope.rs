// src/core/envelope.rs

//! Defines the cache envelope, the tuple stored under every managed key.
//!
//! An envelope is serialized as a plain sequence so that any codec a client
//! configures (bincode, JSON, ...) produces the same on-the-wire layout: two
//! elements for a lock placeholder, three for a valued entry.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// The tuple stored under a managed key: `(processing, soft_expiry, [value])`.
///
/// `soft_expiry` is the protocol-level expiration in fractional unix seconds.
/// It always precedes the store-level TTL, which keeps a soft-expired value
/// readable while one lock holder recomputes.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<V> {
    /// When `true`, some caller has claimed the right to recompute this key.
    pub processing: bool,
    /// Absolute wall-clock timestamp at which the value turns stale.
    pub soft_expiry: f64,
    /// The cached payload. Absent on lock placeholders.
    pub value: Option<V>,
}

impl<V> Envelope<V> {
    /// A lock placeholder: `(true, 0)` with no value.
    ///
    /// Both first-insertion locks and CAS re-locks use this shape. A re-lock
    /// therefore drops the prior value; readers arriving between the CAS and
    /// the final `set` observe the lock and take the wait path.
    pub fn placeholder() -> Self {
        Envelope {
            processing: true,
            soft_expiry: 0.0,
            value: None,
        }
    }

    /// A freshly computed entry expiring (softly) at `soft_expiry`.
    pub fn fresh(soft_expiry: f64, value: V) -> Self {
        Envelope {
            processing: false,
            soft_expiry,
            value: Some(value),
        }
    }

    /// Whether the soft expiry has passed as of `now`.
    pub fn is_expired(&self, now: f64) -> bool {
        self.soft_expiry <= now
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

impl<V: Serialize> Serialize for Envelope<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.value {
            Some(value) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&self.processing)?;
                seq.serialize_element(&self.soft_expiry)?;
                seq.serialize_element(value)?;
                seq.end()
            }
            None => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&self.processing)?;
                seq.serialize_element(&self.soft_expiry)?;
                seq.end()
            }
        }
    }
}

struct EnvelopeVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for EnvelopeVisitor<V> {
    type Value = Envelope<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a sequence of (bool, seconds) or (bool, seconds, value)")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Envelope<V>, A::Error> {
        let processing = seq
            .next_element::<bool>()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let soft_expiry = seq
            .next_element::<f64>()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        let value = seq.next_element::<V>()?;
        Ok(Envelope {
            processing,
            soft_expiry,
            value,
        })
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Envelope<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(EnvelopeVisitor(PhantomData))
    }
}
