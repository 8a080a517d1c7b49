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

//! Concurrent multi-site search: fan-out with per-query timeouts, title
//! normalization, filtering, info-hash deduplication, and ranking, with
//! partial failures carried inside the result envelope.

mod merge;
mod normalize;
mod orchestrator;

pub use merge::dedup_items;
pub use normalize::normalize_title;
pub use orchestrator::{
    MultiSiteSearchQuery, MultiSiteSearchResult, SearchFilters, SearchOrchestrator, SiteFailure,
};
