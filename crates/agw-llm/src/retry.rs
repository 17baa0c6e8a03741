// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with jitter for transient LLM failures.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters. Defaults: 250 ms initial, factor 2, 3 attempts,
/// ±20% jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub factor: f64,
    pub max_attempts: u32,
    /// Fractional jitter applied symmetrically, e.g. 0.2 for ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            factor: 2.0,
            max_attempts: 3,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.initial.as_secs_f64() * self.factor.powi(attempt.saturating_sub(1) as i32);
        let jittered = if self.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            base * (1.0 + spread)
        } else {
            base
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_by_factor_without_jitter() {
        let policy = RetryPolicy {
            initial: Duration::from_millis(250),
            factor: 2.0,
            max_attempts: 3,
            jitter: 0.0,
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(250));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.backoff_delay(1).as_secs_f64();
            assert!(d >= 0.25 * 0.8 - 1e-9, "delay {d} below jitter floor");
            assert!(d <= 0.25 * 1.2 + 1e-9, "delay {d} above jitter ceiling");
        }
    }

    #[test]
    fn defaults_match_documented_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 3);
        assert!((policy.factor - 2.0).abs() < f64::EPSILON);
        assert!((policy.jitter - 0.2).abs() < f64::EPSILON);
    }
}
