//! Retry policy for transient send failures

use sendwell_common::config::DeliveryConfig;
use std::time::Duration;

/// How many times a recipient is tried and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before the recipient is bounced
    pub max_attempts: i32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_secs(config.backoff_base_secs),
            max_delay: Duration::from_secs(config.backoff_max_secs),
        }
    }

    /// True once `attempts` failures have used up the budget
    pub fn exhausted(&self, attempts: i32) -> bool {
        attempts >= self.max_attempts
    }

    /// Delay before the next try after `attempt` failures:
    /// `base * 2^(attempt - 1)`, capped at `max_delay`
    pub fn backoff(&self, attempt: i32) -> Duration {
        let exponent = u32::try_from(attempt.saturating_sub(1).max(0)).unwrap_or(0);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);

        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
