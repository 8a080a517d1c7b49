#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! HTTP substrate for site drivers: per-site sessions with a lifecycle
//! state machine, retry with exponential backoff, mirror-URL failover, a
//! per-endpoint circuit breaker, and an async token-bucket rate limiter.

mod breaker;
mod client;
mod limiter;
mod retry;
mod session;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use client::{FailoverClient, HttpClientConfig};
pub use limiter::{DEFAULT_BURST, DEFAULT_RATE, RateLimiter};
pub use retry::RetryPolicy;
pub use session::{Session, SessionPool, SessionState};
