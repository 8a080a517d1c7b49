//! Rousi: compact JSON API, `x-api-key` auth.

use std::sync::Arc;

use once_cell::sync::Lazy;
use trawler_site_core::{SiteDefinition, SiteSchema};

static DEFINITION: Lazy<Arc<SiteDefinition>> = Lazy::new(|| {
    Arc::new(SiteDefinition {
        aliases: vec!["Rousi".to_string()],
        favicon_url: Some("https://rousi.zip/favicon.ico".to_string()),
        ..SiteDefinition::new(
            "rousi",
            "Rousi",
            SiteSchema::Rousi,
            &["https://rousi.zip"],
        )
    })
});

pub(super) fn definition() -> Arc<SiteDefinition> {
    Arc::clone(&DEFINITION)
}
