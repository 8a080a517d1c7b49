//! Built-in site definitions registered at startup.
//!
//! Each module is pure data: URLs, selectors, pipelines, and ladders for
//! one site. Adding another mirror of a supported schema means adding a
//! module here, not code anywhere else.

use std::sync::Arc;

use trawler_site_core::SiteDefinition;

mod blutopia;
mod dicmusic;
mod hddolby;
mod hdsky;
mod mteam;
mod ourbits;
mod rousi;

/// Every built-in definition, in registration order.
pub(crate) fn builtin_definitions() -> Vec<Arc<SiteDefinition>> {
    vec![
        hdsky::definition(),
        ourbits::definition(),
        mteam::definition(),
        hddolby::definition(),
        rousi::definition(),
        dicmusic::definition(),
        blutopia::definition(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_definition_validates() {
        for definition in builtin_definitions() {
            definition
                .validate()
                .unwrap_or_else(|err| panic!("{} failed validation: {err}", definition.id));
        }
    }

    #[test]
    fn definition_calls_return_the_same_pointer() {
        let first = hdsky::definition();
        let second = hdsky::definition();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
