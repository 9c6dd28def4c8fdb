// src/core/wait.rs

//! The waiter policy: what a caller does after losing the lock race.

use crate::core::HerdGuardError;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Waiter callback for a single-key call. Whatever it resolves to becomes the
/// caller's result.
pub type SingleWaitFn<V> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Option<V>, HerdGuardError>> + Send + Sync>;

/// Waiter callback for a multi-key call. It receives the still-unresolved
/// keys and must return a mapping, which is merged into the output.
pub type MultiWaitFn<V> = Arc<
    dyn Fn(Vec<Bytes>) -> BoxFuture<'static, Result<HashMap<Bytes, V>, HerdGuardError>>
        + Send
        + Sync,
>;

/// Behaviour when this caller loses the lock race.
pub enum Wait<F> {
    /// Sleep for the given seconds, then retry the whole coordinator once.
    /// `None` sleeps for the configured default (falling back to the call's
    /// `compute_time`). A retry that loses again gives up with an empty
    /// result, bounding the recursion to one level.
    Sleep(Option<f64>),
    /// Yield control to the callback instead of sleeping.
    Callback(F),
}

impl<F> Default for Wait<F> {
    fn default() -> Self {
        Wait::Sleep(None)
    }
}

impl<F> fmt::Debug for Wait<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wait::Sleep(seconds) => f.debug_tuple("Sleep").field(seconds).finish(),
            Wait::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}
