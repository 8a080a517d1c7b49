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

//! Per-site account snapshot service: scheduled fetches with bounded
//! concurrency, a TTL cache over a persistent repository, and cross-site
//! aggregation.

mod repo;
mod service;

pub use repo::{InMemoryUserInfoRepo, UserInfoRepo};
pub use service::{SyncFailure, UserInfoService, UserInfoSyncResult};
