//! Health monitor timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default scan interval: 2 minutes.
pub const DEFAULT_INTERVAL_MS: u64 = 120_000;
/// Default heartbeat timeout: 3 minutes.
pub const DEFAULT_TIMEOUT_MINUTES: f64 = 3.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("health check interval must be positive")]
    ZeroInterval,

    #[error("heartbeat timeout must be a positive number of minutes, got {0}")]
    InvalidTimeout(f64),
}

/// Scan interval and staleness threshold.
///
/// The timeout is given in (possibly fractional) minutes so short test
/// cycles can be configured, e.g. `0.01` minutes = 600 ms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_ms: u64,
    pub timeout_minutes: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
        }
    }
}

impl HealthConfig {
    pub fn new(interval_ms: u64, timeout_minutes: f64) -> Result<Self, ConfigError> {
        let config = Self {
            interval_ms,
            timeout_minutes,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if !self.timeout_minutes.is_finite() || self.timeout_minutes <= 0.0 {
            return Err(ConfigError::InvalidTimeout(self.timeout_minutes));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_minutes.max(0.0) * 60.0)
    }
}
