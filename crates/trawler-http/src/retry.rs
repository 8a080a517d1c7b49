//! Retry policy: exponential backoff with optional jitter and a whitelist
//! of retryable status codes.

use std::time::Duration;

use rand::Rng;

const DEFAULT_RETRYABLE: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];
const JITTER_FRACTION: f64 = 0.25;

/// Backoff and retry configuration for one substrate client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single backoff sleep.
    pub max_backoff: Duration,
    /// Growth factor between consecutive backoffs.
    pub multiplier: f64,
    /// Add up to +25% uniform jitter to each sleep.
    pub jitter: bool,
    /// Status codes eligible for retry.
    pub retryable_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            retryable_status: DEFAULT_RETRYABLE.to_vec(),
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

    /// Whether `status` is on the retry whitelist.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status.contains(&status)
    }

    /// Sleep before the `retry`-th retry (1-based):
    /// `min(initial * multiplier^(retry-1), max)`, plus jitter when enabled.
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent_i32(exponent));
        let capped = base.min(self.max_backoff.as_secs_f64());
        let with_jitter = if self.jitter {
            capped * (1.0 + rand::rng().random_range(0.0..JITTER_FRACTION))
        } else {
            capped
        };
        Duration::from_secs_f64(with_jitter.min(self.max_backoff.as_secs_f64() * (1.0 + JITTER_FRACTION)))
    }
}

fn exponent_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(450),
            multiplier: 2.0,
            jitter: false,
            retryable_status: DEFAULT_RETRYABLE.to_vec(),
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(450), "capped");
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            jitter: true,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.backoff_delay(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(126));
        }
    }

    #[test]
    fn default_whitelist_matches_contract() {
        let policy = RetryPolicy::default();
        for status in [408, 425, 429, 500, 502, 503, 504] {
            assert!(policy.is_retryable_status(status));
        }
        for status in [200, 301, 401, 403, 404, 418] {
            assert!(!policy.is_retryable_status(status));
        }
    }
}
