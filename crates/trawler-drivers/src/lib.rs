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

//! Schema drivers, the rate-limiting site wrapper, the site factory, and
//! the built-in site definitions.
//!
//! Each driver module encodes one wire-protocol family; the generic
//! user-info pipeline and detail parser are parameterised entirely by the
//! site definition, so supporting another mirror of a known schema is a
//! definition, not code.

mod base;
mod de;
mod defs;
mod detail;
mod factory;
mod gazelle;
mod hddolby;
mod listing;
mod mtorrent;
mod nexusphp;
mod pipeline;
mod rousi;
mod unit3d;

pub use base::BaseSite;
pub use detail::{TorrentDetail, parse_detail_page};
pub use factory::SiteFactory;
pub use gazelle::GazelleDriver;
pub use hddolby::HdDolbyDriver;
pub use mtorrent::MTorrentDriver;
pub use nexusphp::NexusPhpDriver;
pub use pipeline::run_user_info_pipeline;
pub use rousi::RousiDriver;
pub use unit3d::Unit3dDriver;

use trawler_site_core::{SiteSchema, definition_registry, driver_registry};

/// Register every built-in driver constructor and site definition.
///
/// Idempotent: the registries treat identical re-registration as a no-op,
/// so process bootstrap and tests may both call this.
pub fn register_builtin() {
    let drivers = driver_registry();
    drivers.register(SiteSchema::NexusPhp, nexusphp::create);
    drivers.register(SiteSchema::MTorrent, mtorrent::create);
    drivers.register(SiteSchema::Gazelle, gazelle::create);
    drivers.register(SiteSchema::Unit3d, unit3d::create);
    drivers.register(SiteSchema::HdDolby, hddolby::create);
    drivers.register(SiteSchema::Rousi, rousi::create);

    let definitions = definition_registry();
    for definition in defs::builtin_definitions() {
        definitions
            .register(definition)
            .expect("built-in site definitions validate");
    }
}
