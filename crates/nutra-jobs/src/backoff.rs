//! Retry scheduling for failed resolution attempts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nutra_core::defaults;
use rand::Rng;

/// Retry schedule shared by every worker instance.
///
/// Delays grow exponentially from `base_delay` (60s, 120s, 240s...),
/// capped at `max_delay`, with jitter so workers restarted together do
/// not retry in lockstep. One policy drives both the rescheduling delay
/// and the attempt budget, so the two can never disagree.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Attempts after which a retryable failure becomes terminal.
    pub max_attempts: i32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(defaults::BACKOFF_BASE_SECS),
            max_delay: Duration::from_secs(defaults::BACKOFF_CAP_SECS),
            max_attempts: defaults::DISCOVERY_MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Build a policy from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DISCOVERY_BACKOFF_BASE_SECS` | `60` | Delay before the second attempt |
    /// | `DISCOVERY_BACKOFF_CAP_SECS` | `3600` | Ceiling for any single delay |
    /// | `DISCOVERY_MAX_ATTEMPTS` | `3` | Attempts before an item is marked failed |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |name: &str, fallback: Duration| -> Duration {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            base_delay: secs("DISCOVERY_BACKOFF_BASE_SECS", defaults.base_delay),
            max_delay: secs("DISCOVERY_BACKOFF_CAP_SECS", defaults.max_delay),
            max_attempts: std::env::var("DISCOVERY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse::<i32>().ok())
                .map(|v| v.max(1))
                .unwrap_or(defaults.max_attempts),
        }
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the delay ceiling.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the attempt budget (minimum 1).
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// True once `attempt_count` completed attempts leave no budget for
    /// another try.
    pub fn attempts_exhausted(&self, attempt_count: i32) -> bool {
        attempt_count >= self.max_attempts
    }

    /// Delay to apply after the given attempt failed (1-based).
    ///
    /// Jitter scales the exponential delay into `[0.5, 1.0]` of its
    /// nominal value, so the returned duration is never above the cap
    /// and never below half the schedule.
    pub fn delay_after(&self, attempt: i32) -> Duration {
        let exponent = attempt.saturating_sub(1).clamp(0, 16) as u32;
        let nominal = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        nominal.mul_f64(jitter)
    }

    /// Wall-clock time before which the item must not be claimed again.
    pub fn next_attempt_at(&self, attempt: i32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_after(attempt))
            .unwrap_or_else(|_| chrono::Duration::seconds(defaults::BACKOFF_CAP_SECS as i64));
        now + delay
    }
}
