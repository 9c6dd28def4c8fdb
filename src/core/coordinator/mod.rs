// src/core/coordinator/mod.rs

//! The coordination protocol over Memcached's `add`/`gets`/`cas` primitives.
//!
//! A coordinator call classifies the observed envelope into one of four
//! outcomes (hit, wait, cas-upgrade, add-attempt), drives each through the
//! client, invokes the compute callback only for keys it has locked, and
//! writes fresh envelopes back. Correctness is achieved entirely through the
//! shared store: at most one caller per key wins the `add` or the `cas` to
//! the processing state between two successive fresh writes, and a crashed
//! winner is released by the placeholder TTL.

mod multi;
mod single;

use crate::config::CoordinatorConfig;
use crate::core::HerdGuardError;
use crate::core::client::MemcacheClient;
use crate::core::clock::{Clock, SystemClock};
use crate::core::wait::Wait;
use std::sync::Arc;

/// Per-call overrides for the configured defaults.
#[derive(Debug)]
pub struct FetchOptions<F> {
    /// Upper bound in seconds on one recomputation; also the TTL on the lock
    /// placeholder. `None` uses the configured default.
    pub compute_time: Option<f64>,
    /// What to do after losing the lock race.
    pub wait: Wait<F>,
}

impl<F> Default for FetchOptions<F> {
    fn default() -> Self {
        FetchOptions {
            compute_time: None,
            wait: Wait::default(),
        }
    }
}

impl<F> FetchOptions<F> {
    pub fn compute_time(mut self, seconds: f64) -> Self {
        self.compute_time = Some(seconds);
        self
    }

    pub fn wait(mut self, wait: Wait<F>) -> Self {
        self.wait = wait;
        self
    }
}

/// Mediates expensive value computation through a Memcached cluster so that a
/// near-synchronous fleet of callers cannot stampede the backing system.
///
/// Holds no process-wide state beyond its injected dependencies; any number
/// of coordinators in any number of processes cooperate solely through the
/// shared store.
pub struct CacheCoordinator<C: MemcacheClient> {
    client: C,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

impl<C: MemcacheClient> CacheCoordinator<C> {
    pub fn new(client: C) -> Self {
        Self::with_config(client, CoordinatorConfig::default())
    }

    pub fn with_config(client: C, config: CoordinatorConfig) -> Self {
        CacheCoordinator {
            client,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the clock, typically with a virtual one in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn resolve_compute_time(&self, requested: Option<f64>) -> f64 {
        requested.unwrap_or(self.config.compute_time)
    }

    fn resolve_wait_seconds(&self, requested: Option<f64>, compute_time: f64) -> f64 {
        requested
            .or(self.config.wait_seconds)
            .unwrap_or(compute_time)
    }

    /// TTL on a lock placeholder, bounding the worst-case stall on holder
    /// death.
    fn placeholder_ttl(compute_time: f64) -> u32 {
        compute_time.ceil() as u32
    }

    /// TTL on a fresh envelope: the soft expiry plus the stale-serve
    /// afterlife of one recomputation. Clamped to one second because a zero
    /// TTL reads as "never expires" to Memcached.
    fn value_ttl(expiration: f64, compute_time: f64) -> u32 {
        (expiration + compute_time.ceil()).ceil().max(1.0) as u32
    }

    fn validate_timing(expiration: f64, compute_time: f64) -> Result<(), HerdGuardError> {
        if !expiration.is_finite() || expiration < 0.0 {
            return Err(HerdGuardError::InvalidArgument(format!(
                "expiration must be a non-negative number of seconds, got {expiration}"
            )));
        }
        if !compute_time.is_finite() || compute_time <= 0.0 {
            return Err(HerdGuardError::InvalidArgument(format!(
                "compute_time must be a positive number of seconds, got {compute_time}"
            )));
        }
        Ok(())
    }
}
