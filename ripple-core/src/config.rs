//! Configuration types shared by the sync loop, the policy engine, and the
//! top-level store facade.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RippleError, RippleResult, ValidationError};

/// Retry/backoff configuration for the sync loop's exponential-backoff
/// retry of failed remote writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the computed backoff to randomize, in `[0.0, 1.0]`, to
    /// avoid synchronized retry storms across many clients.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// The backoff delay before attempt `attempt` (1-indexed), before
    /// jitter is applied: `min(initial * multiplier^(attempt-1), max)`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scaled = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent as i32);
        let capped = scaled.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    pub fn validate(&self) -> RippleResult<()> {
        if self.backoff_multiplier <= 0.0 {
            return Err(RippleError::Validation(ValidationError::InvalidValue {
                field: "backoff_multiplier".into(),
                reason: "must be positive".into(),
            }));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(RippleError::Validation(ValidationError::InvalidValue {
                field: "jitter_factor".into(),
                reason: "must be between 0.0 and 1.0".into(),
            }));
        }
        if self.initial_backoff.is_zero() {
            return Err(RippleError::Validation(ValidationError::InvalidValue {
                field: "initial_backoff".into(),
                reason: "must be positive".into(),
            }));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(RippleError::Validation(ValidationError::InvalidValue {
                field: "max_backoff".into(),
                reason: "must be >= initial_backoff".into(),
            }));
        }
        Ok(())
    }
}

/// Master configuration for a `StoreHandle`. All sub-configs have sane
/// defaults; `validate()` catches contradictory overrides before the store
/// is built rather than failing midway through the first sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub fetch_policy: crate::policy::FetchPolicy,
    pub write_policy: crate::policy::WritePolicy,
    pub conflict_resolution: crate::policy::ConflictResolution,
    pub sync_mode: crate::policy::SyncMode,
    pub retry: RetryConfig,
    /// Default staleness horizon applied to cache entries that don't set
    /// their own `stale_at`; `None` means entries are never stale by default.
    pub default_staleness: Option<Duration>,
    /// Interval between sync cycles when `sync_mode` is `Periodic`.
    pub periodic_sync_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            fetch_policy: crate::policy::FetchPolicy::default(),
            write_policy: crate::policy::WritePolicy::default(),
            conflict_resolution: crate::policy::ConflictResolution::default(),
            sync_mode: crate::policy::SyncMode::default(),
            retry: RetryConfig::default(),
            default_staleness: None,
            periodic_sync_interval: Duration::from_secs(60),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> RippleResult<()> {
        self.retry.validate()?;
        if self.periodic_sync_interval.is_zero() {
            return Err(RippleError::Validation(ValidationError::InvalidValue {
                field: "periodic_sync_interval".into(),
                reason: "must be positive".into(),
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_and_caps() {
        let cfg = RetryConfig {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(cfg.base_delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(cfg.base_delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(cfg.base_delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(cfg.base_delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn invalid_jitter_factor_rejected() {
        let mut cfg = RetryConfig::default();
        cfg.jitter_factor = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn store_config_default_is_valid() {
        assert!(StoreConfig::default().validate().is_ok());
    }
}
