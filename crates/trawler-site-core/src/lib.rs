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

//! Site-agnostic interfaces and DTOs shared across the Trawler workspace.
//!
//! This crate defines the portable data model (torrents, account snapshots,
//! search queries), the declarative [`SiteDefinition`] consumed by
//! definition-driven drivers, the process-wide definition and driver
//! registries, and the capability traits every site driver implements.

mod cache;
mod config;
mod definition;
mod error;
mod model;
mod registry;
mod service;

pub use cache::TtlCache;
pub use config::SiteConfig;
pub use definition::{
    DefinitionError, DetailParserConfig, FieldSelector, FilterCall, LevelLadder, LevelPosition,
    RequestConfig, ResponseType, SiteDefinition, SiteLevelRequirement, UserInfoConfig,
    UserInfoStep, parse_iso8601_duration,
};
pub use error::{SiteError, SiteResult};
pub use model::{
    AggregatedStats, AuthMethod, DiscountLevel, SearchQuery, SiteSchema, SortField, SortOrder,
    TorrentItem, UserInfo, format_bytes, parse_size_string,
};
pub use registry::{
    DefinitionRegistry, DriverConstructor, DriverRegistry, definition_registry, driver_registry,
};
pub use service::{
    DriverContext, DriverRequest, DriverResponse, HttpExecutor, HttpMethod, RequestBody, Site,
    SiteDriver,
};
