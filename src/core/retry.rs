//! Retry policy for transient executor failures.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

/// Exponential backoff with jitter.
///
/// The delay before retry `n` (1-based) is `base * multiplier^(n-1)`, capped at
/// `max_delay`, then scaled by a random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor between consecutive retries.
    pub multiplier: f64,
    /// Upper bound on a single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Relative jitter in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 5_000,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Validate the policy values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "retry.multiplier",
                format!("must be >= 1.0, got {}", self.multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::invalid(
                "retry.jitter",
                format!("must be within [0, 1], got {}", self.jitter),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                "must not be smaller than retry.base_delay_ms",
            ));
        }
        Ok(())
    }

    /// Whether another attempt is allowed after `attempts` executor calls.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Delay before the given retry, without jitter.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = (self.base_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before the given retry, with jitter applied.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let factor = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        nominal.mul_f64(factor)
    }
}
