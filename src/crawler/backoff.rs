//! Retry delay policy for transient fetch failures

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with a cap and additive uniform jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random extra delay
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// `min(base * 2^attempt, cap)` for the zero-based failed attempt
    pub fn exponential(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retrying after failed attempt `attempt`
    ///
    /// A server-supplied `retry_after` replaces the computed delay for this
    /// attempt only.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint;
        }
        self.exponential(attempt) + self.sample_jitter()
    }

    fn sample_jitter(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: Duration::from_millis(jitter_ms),
        }
    }

    #[test]
    fn test_exponential_sequence() {
        let policy = policy(0);
        assert_eq!(policy.exponential(0), Duration::from_secs(1));
        assert_eq!(policy.exponential(1), Duration::from_secs(2));
        assert_eq!(policy.exponential(2), Duration::from_secs(4));
        assert_eq!(policy.exponential(4), Duration::from_secs(16));
        assert_eq!(policy.exponential(5), Duration::from_secs(30));
    }

    #[test]
    fn test_never_exceeds_cap_even_for_huge_attempts() {
        let policy = policy(0);
        assert_eq!(policy.exponential(31), Duration::from_secs(30));
        assert_eq!(policy.exponential(64), Duration::from_secs(30));
        assert_eq!(policy.exponential(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_delays_non_decreasing_and_bounded() {
        let policy = policy(250);
        let cap = policy.max_delay + policy.jitter;
        let mut previous = Duration::ZERO;

        for attempt in 0..12 {
            let base = policy.exponential(attempt);
            assert!(base >= previous);
            previous = base;

            let delay = policy.delay(attempt, None);
            assert!(delay >= base);
            assert!(delay <= base + policy.jitter);
            assert!(delay <= cap);
        }
    }

    #[test]
    fn test_retry_after_overrides() {
        let policy = policy(250);
        assert_eq!(
            policy.delay(0, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(policy.delay(3, Some(Duration::ZERO)), Duration::ZERO);
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 4000,
            jitter_ms: 0,
        });
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.delay(0, None), Duration::from_millis(500));
        assert_eq!(policy.delay(10, None), Duration::from_millis(4000));
    }
}
