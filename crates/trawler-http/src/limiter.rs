//! Async token-bucket rate limiter.
//!
//! Tokens are accounted in micro-token units so fractional rates refill
//! without drift. Waiting is a plain cancellable sleep loop: callers bound
//! it with `tokio::time::timeout` and map expiry to a *rate-limit* error.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::time::sleep;

const TOKEN_SCALE: u64 = 1_000_000;

/// Default sustained rate applied when a definition does not override it.
pub const DEFAULT_RATE: f64 = 1.0;
/// Default burst allowance applied when a definition does not override it.
pub const DEFAULT_BURST: u32 = 3;

struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// Token bucket with a sustained rate (requests/second) and a burst
/// capacity, starting full.
pub struct RateLimiter {
    rate: f64,
    burst: u32,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Build a limiter; non-positive rates and zero bursts are clamped to
    /// the minimum useful values.
    #[must_use]
    pub fn new(rate: f64, burst: u32) -> Self {
        let rate = if rate > 0.0 { rate } else { DEFAULT_RATE };
        let burst = burst.max(1);
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: u64::from(burst) * TOKEN_SCALE,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Configured sustained rate in requests per second.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Configured burst allowance.
    #[must_use]
    pub const fn burst(&self) -> u32 {
        self.burst
    }

    /// Take one token, waiting for a refill when the bucket is empty.
    ///
    /// The wait is a cancellable sleep; dropping the future releases
    /// nothing because the token is only taken on success.
    pub async fn acquire(&self) {
        loop {
            match self.try_take(Instant::now()) {
                Ok(()) => return,
                Err(wait) => sleep(wait).await,
            }
        }
    }

    /// Take one token without waiting.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.try_take(Instant::now()).is_ok()
    }

    fn try_take(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.state.lock().expect("rate limiter poisoned");
        self.refill(&mut state, now);
        if state.tokens >= TOKEN_SCALE {
            state.tokens -= TOKEN_SCALE;
            return Ok(());
        }
        let deficit = TOKEN_SCALE - state.tokens;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wait_micros = (deficit as f64 / (self.rate * TOKEN_SCALE as f64) * 1_000_000.0).ceil() as u64;
        Err(Duration::from_micros(wait_micros.max(1)))
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let replenished = (elapsed.as_secs_f64() * self.rate * TOKEN_SCALE as f64) as u64;
        if replenished > 0 {
            let capacity = u64::from(self.burst) * TOKEN_SCALE;
            state.tokens = (state.tokens + replenished).min(capacity);
            state.last_refill = now;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE, DEFAULT_BURST)
    }
}
