//! ---
//! rcs_section: "07-resilience-fault-tolerance"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Retry and backoff policy for transient device faults."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use r_rcs_common::config::SchedulerConfig;

/// Policy parameters controlling retry attempts on transient device faults.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
    /// Base delay applied before the second attempt (exponential backoff).
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay. Defaults to the cycle
    /// interval, so a retry storm never outlasts a full pause.
    pub cap: Duration,
    /// Maximum jitter added to each delay. Zero keeps delays exactly
    /// non-decreasing.
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration, cap: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            cap,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Derive the policy from scheduler configuration, capping at the cycle
    /// interval.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            cap: config.cycle_interval,
            jitter: config.retry_jitter,
        }
    }

    /// Total attempts permitted within a cycle for one adapter.
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Calculate the delay preceding the given retry (1-indexed) with
    /// exponential growth.
    pub fn backoff_delay(&self, retry: usize, rng: &mut StdRng) -> Duration {
        let exponent = (retry.saturating_sub(1) as u32).min(8);
        let base = self.base_delay.mul_f64(2u32.pow(exponent) as f64);
        let delay = if self.jitter.is_zero() {
            base
        } else {
            let jitter_ms = rng.gen_range(0..=self.jitter.as_millis().max(1)) as u64;
            base + Duration::from_millis(jitter_ms)
        };
        delay.min(self.cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(10));
        let mut rng = StdRng::seed_from_u64(7);
        let delays: Vec<Duration> = (1..=6)
            .map(|retry| policy.backoff_delay(retry, &mut rng))
            .collect();
        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(2));
        assert_eq!(delays[2], Duration::from_secs(4));
        assert_eq!(delays[3], Duration::from_secs(8));
        assert_eq!(delays[4], Duration::from_secs(10));
        assert_eq!(delays[5], Duration::from_secs(10));
    }

    #[test]
    fn delays_are_non_decreasing_without_jitter() {
        let policy = RetryPolicy::new(8, Duration::from_millis(250), Duration::from_secs(10));
        let mut rng = StdRng::seed_from_u64(7);
        let mut previous = Duration::ZERO;
        for retry in 1..=10 {
            let delay = policy.backoff_delay(retry, &mut rng);
            assert!(delay >= previous, "delay shrank at retry {retry}");
            assert!(delay <= policy.cap);
            previous = delay;
        }
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30))
            .with_jitter(Duration::from_millis(100));
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let delay = policy.backoff_delay(1, &mut rng);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn exponent_is_clamped() {
        let policy = RetryPolicy::new(usize::MAX, Duration::from_secs(1), Duration::MAX);
        let mut rng = StdRng::seed_from_u64(7);
        let delay = policy.backoff_delay(1000, &mut rng);
        assert_eq!(delay, Duration::from_secs(256));
    }
}
