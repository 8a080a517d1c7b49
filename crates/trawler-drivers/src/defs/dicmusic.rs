//! DICMusic: Gazelle, cookie or API key.

use std::sync::Arc;

use once_cell::sync::Lazy;
use trawler_site_core::{AuthMethod, SiteDefinition, SiteSchema};

static DEFINITION: Lazy<Arc<SiteDefinition>> = Lazy::new(|| {
    Arc::new(SiteDefinition {
        aliases: vec!["DICMusic".to_string(), "海豚".to_string()],
        auth_method: AuthMethod::Cookie,
        favicon_url: Some("https://dicmusic.com/favicon.ico".to_string()),
        ..SiteDefinition::new(
            "dicmusic",
            "DICMusic",
            SiteSchema::Gazelle,
            &["https://dicmusic.com"],
        )
    })
});

pub(super) fn definition() -> Arc<SiteDefinition> {
    Arc::clone(&DEFINITION)
}
