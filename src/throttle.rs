//! Back-off for repeated failed code submissions.
//!
//! Lives outside [`crate::gate`]: the gate judges one code, the limiter
//! decides whether a code may be judged at all.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ThrottleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// Consecutive failures allowed before the first lockout.
    pub free_attempts: u32,
    pub base_delay: TimeDelta,
    pub max_delay: TimeDelta,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            free_attempts: 5,
            base_delay: TimeDelta::seconds(30),
            max_delay: TimeDelta::hours(1),
        }
    }
}

impl ThrottlePolicy {
    /// Lockout after the `failures`-th consecutive failure, if any.
    pub fn delay_for(&self, failures: u32) -> Option<TimeDelta> {
        if failures < self.free_attempts {
            return None;
        }
        let exponent = (failures - self.free_attempts).min(20);
        let delay = self
            .base_delay
            .checked_mul(1i32 << exponent)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

/// Failure counter persisted with the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptLimiter {
    #[serde(default)]
    failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    locked_until: Option<DateTime<Utc>>,
}

impl AttemptLimiter {
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        self.locked_until
    }

    pub fn check(&self, now: DateTime<Utc>) -> Result<(), ThrottleError> {
        match self.locked_until {
            Some(until) if now < until => Err(ThrottleError::Locked { until }),
            _ => Ok(()),
        }
    }

    pub fn record_failure(&mut self, policy: &ThrottlePolicy, now: DateTime<Utc>) {
        self.failures = self.failures.saturating_add(1);
        if let Some(delay) = policy.delay_for(self.failures) {
            let until = now + delay;
            warn!(failures = self.failures, %until, "too many failed attempts; locking");
            self.locked_until = Some(until);
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.locked_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_attempts_do_not_lock() {
        let policy = ThrottlePolicy::default();
        let mut limiter = AttemptLimiter::default();
        let now = Utc::now();

        for _ in 0..4 {
            limiter.record_failure(&policy, now);
            assert!(limiter.check(now).is_ok());
        }
    }

    #[test]
    fn lockout_doubles_and_is_capped() {
        let policy = ThrottlePolicy::default();
        assert_eq!(policy.delay_for(4), None);
        assert_eq!(policy.delay_for(5), Some(TimeDelta::seconds(30)));
        assert_eq!(policy.delay_for(6), Some(TimeDelta::seconds(60)));
        assert_eq!(policy.delay_for(7), Some(TimeDelta::seconds(120)));
        assert_eq!(policy.delay_for(40), Some(TimeDelta::hours(1)));
        assert_eq!(policy.delay_for(u32::MAX), Some(TimeDelta::hours(1)));
    }

    #[test]
    fn locked_until_delay_elapses() {
        let policy = ThrottlePolicy::default();
        let mut limiter = AttemptLimiter::default();
        let now = Utc::now();

        for _ in 0..5 {
            limiter.record_failure(&policy, now);
        }
        let until = now + TimeDelta::seconds(30);
        assert_eq!(limiter.check(now), Err(ThrottleError::Locked { until }));
        assert!(limiter.check(until).is_ok());
    }

    #[test]
    fn success_resets_the_counter() {
        let policy = ThrottlePolicy::default();
        let mut limiter = AttemptLimiter::default();
        let now = Utc::now();

        for _ in 0..6 {
            limiter.record_failure(&policy, now);
        }
        limiter.record_success();
        assert_eq!(limiter.failures(), 0);
        assert!(limiter.check(now).is_ok());
    }
}
