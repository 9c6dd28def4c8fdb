// src/config.rs

//! Manages coordinator configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::info;

/// Defaults applied to every coordinator call unless overridden per call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Upper bound in seconds on one recomputation. Doubles as the TTL on
    /// lock placeholders, so it also bounds the stall after a holder crash.
    #[serde(default = "default_compute_time")]
    pub compute_time: f64,
    /// Seconds a defeated caller sleeps before its single retry. When unset,
    /// the call's `compute_time` is used.
    #[serde(default)]
    pub wait_seconds: Option<f64>,
    /// Retry passes a defeated caller makes before giving up.
    #[serde(default = "default_waiter_retries")]
    pub waiter_retries: u32,
}

fn default_compute_time() -> f64 {
    2.0
}
fn default_waiter_retries() -> u32 {
    1
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            compute_time: default_compute_time(),
            wait_seconds: None,
            waiter_retries: default_waiter_retries(),
        }
    }
}

impl CoordinatorConfig {
    /// Creates a new `CoordinatorConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: CoordinatorConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        info!(path, "loaded coordinator configuration");
        Ok(config)
    }

    /// Validates the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if !self.compute_time.is_finite() || self.compute_time <= 0.0 {
            return Err(anyhow!(
                "compute_time must be a positive number of seconds"
            ));
        }
        if let Some(wait) = self.wait_seconds
            && (!wait.is_finite() || wait < 0.0)
        {
            return Err(anyhow!(
                "wait_seconds must be a non-negative number of seconds"
            ));
        }
        Ok(())
    }
}
