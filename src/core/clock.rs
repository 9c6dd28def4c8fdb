// src/core/clock.rs

//! The clock/sleep facade: wall-clock seconds with sub-second precision and
//! cooperative sleep. Injected so that tests can substitute a virtual clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Provides the current time in fractional unix seconds and a cooperative
/// sleep. In a cooperative-task runtime the sleep suspends the task, not the
/// OS thread.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
    async fn sleep(&self, seconds: f64);
}

/// The production clock: system wall-clock time and `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    async fn sleep(&self, seconds: f64) {
        if seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
    }
}

/// A virtual clock for tests. `sleep` advances the virtual time instead of
/// suspending, so a waiter's pause is observable without real delays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    /// Moves the virtual time forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }

    async fn sleep(&self, seconds: f64) {
        if seconds > 0.0 {
            self.advance(seconds);
        }
    }
}
