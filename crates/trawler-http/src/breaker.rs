//! Per-endpoint circuit breaker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling-window and cool-down configuration for a breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures within the window that trip the breaker.
    pub failure_threshold: u32,
    /// Length of the rolling failure window.
    pub window: Duration,
    /// How long the breaker stays open before probing.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests pass through.
    Closed,
    /// Requests fail fast until the cool-down elapses.
    Open,
    /// One probe request is allowed; its outcome decides the next state.
    HalfOpen,
}

/// Failure-rate tracker for one (site, endpoint) pair.
///
/// Not internally synchronized; the substrate keeps one behind a mutex per
/// endpoint.
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            probe_in_flight: false,
        }
    }

    /// Current state, with the cool-down clock folded in.
    #[must_use]
    pub fn state(&mut self, now: Instant) -> BreakerState {
        self.roll(now);
        self.state
    }

    /// Whether a request may proceed at `now`.
    ///
    /// In half-open state the first caller wins the probe slot; everyone
    /// else fails fast until the probe's outcome is recorded.
    #[must_use]
    pub fn allow(&mut self, now: Instant) -> bool {
        self.roll(now);
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if self.probe_in_flight {
                    false
                } else {
                    self.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful round-trip.
    pub fn record_success(&mut self) {
        self.failures.clear();
        self.opened_at = None;
        self.probe_in_flight = false;
        self.state = BreakerState::Closed;
    }

    /// Record a failed round-trip at `now`.
    pub fn record_failure(&mut self, now: Instant) {
        match self.state {
            BreakerState::HalfOpen => {
                // Failed probe: back to open, restart the cool-down.
                self.probe_in_flight = false;
                self.state = BreakerState::Open;
                self.opened_at = Some(now);
            }
            BreakerState::Open => {}
            BreakerState::Closed => {
                self.failures.push_back(now);
                self.trim(now);
                let recent = u32::try_from(self.failures.len()).unwrap_or(u32::MAX);
                if recent >= self.config.failure_threshold {
                    self.state = BreakerState::Open;
                    self.opened_at = Some(now);
                    self.failures.clear();
                }
            }
        }
    }

    fn roll(&mut self, now: Instant) {
        if self.state == BreakerState::Open
            && let Some(opened_at) = self.opened_at
            && now.saturating_duration_since(opened_at) >= self.config.cooldown
        {
            self.state = BreakerState::HalfOpen;
            self.probe_in_flight = false;
        }
        if self.state == BreakerState::Closed {
            self.trim(now);
        }
    }

    fn trim(&mut self, now: Instant) {
        while let Some(oldest) = self.failures.front() {
            if now.saturating_duration_since(*oldest) > self.config.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            window: Duration::from_secs(10),
            cooldown: Duration::from_secs(5),
        }
    }

    #[test]
    fn opens_after_threshold_failures_in_window() {
        let mut breaker = CircuitBreaker::new(config());
        let now = Instant::now();
        for _ in 0..2 {
            breaker.record_failure(now);
        }
        assert_eq!(breaker.state(now), BreakerState::Closed);
        breaker.record_failure(now);
        assert_eq!(breaker.state(now), BreakerState::Open);
        assert!(!breaker.allow(now));
    }

    #[test]
    fn half_open_after_cooldown_with_single_probe() {
        let mut breaker = CircuitBreaker::new(config());
        let now = Instant::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }
        let later = now + Duration::from_secs(6);
        assert!(breaker.allow(later), "first probe allowed");
        assert!(!breaker.allow(later), "second caller fails fast");
    }

    #[test]
    fn probe_success_closes_probe_failure_reopens() {
        let mut breaker = CircuitBreaker::new(config());
        let now = Instant::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }
        let later = now + Duration::from_secs(6);
        assert!(breaker.allow(later));
        breaker.record_success();
        assert_eq!(breaker.state(later), BreakerState::Closed);
        assert!(breaker.allow(later));

        for _ in 0..3 {
            breaker.record_failure(later);
        }
        let probe_time = later + Duration::from_secs(6);
        assert!(breaker.allow(probe_time));
        breaker.record_failure(probe_time);
        assert_eq!(breaker.state(probe_time), BreakerState::Open);
        assert!(!breaker.allow(probe_time));
    }

    #[test]
    fn stale_failures_roll_out_of_the_window() {
        let mut breaker = CircuitBreaker::new(config());
        let now = Instant::now();
        breaker.record_failure(now);
        breaker.record_failure(now);
        let much_later = now + Duration::from_secs(20);
        breaker.record_failure(much_later);
        assert_eq!(
            breaker.state(much_later),
            BreakerState::Closed,
            "old failures expired"
        );
    }
}
