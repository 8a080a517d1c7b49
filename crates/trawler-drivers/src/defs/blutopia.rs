//! Blutopia: Unit3D, bearer-token API.

use std::sync::Arc;

use once_cell::sync::Lazy;
use trawler_site_core::{SiteDefinition, SiteSchema};

static DEFINITION: Lazy<Arc<SiteDefinition>> = Lazy::new(|| {
    Arc::new(SiteDefinition {
        aliases: vec!["Blutopia".to_string()],
        timezone_offset: "+0000".to_string(),
        favicon_url: Some("https://blutopia.cc/favicon.ico".to_string()),
        ..SiteDefinition::new(
            "blutopia",
            "Blutopia",
            SiteSchema::Unit3d,
            &["https://blutopia.cc"],
        )
    })
});

pub(super) fn definition() -> Arc<SiteDefinition> {
    Arc::clone(&DEFINITION)
}
