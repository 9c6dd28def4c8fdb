// src/core/errors.rs

//! Defines the primary error type for the entire crate.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the coordination layer.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
///
/// Lost CAS races and `add` collisions are never surfaced through this type;
/// they route the caller to the waiter branch instead.
#[derive(Error, Debug, Clone)]
pub enum HerdGuardError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Compute callback failed: {0}")]
    Compute(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed cache envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for HerdGuardError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
