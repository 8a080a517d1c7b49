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

//! Declarative field extraction: a registry of named value filters and a
//! selector engine applying them to scraped HTML or decoded JSON.

mod error;
mod filters;
mod selector;
mod value;

pub use error::{ExtractError, ExtractResult};
pub use filters::{FilterFn, apply_filters, register_filter};
pub use selector::{json_path, select_from_document, select_from_element, select_from_json};
pub use value::Value;
