//! HDDolby: NexusPHP derivative with a JSON API; API key plus cookie.

use std::sync::Arc;

use once_cell::sync::Lazy;
use trawler_site_core::{SiteDefinition, SiteLevelRequirement, SiteSchema};

static DEFINITION: Lazy<Arc<SiteDefinition>> = Lazy::new(|| {
    Arc::new(SiteDefinition {
        aliases: vec!["HDDolby".to_string(), "杜比".to_string()],
        favicon_url: Some("https://www.hddolby.com/favicon.ico".to_string()),
        rate_limit: 1.0,
        rate_burst: 3,
        level_requirements: vec![
            SiteLevelRequirement {
                id: 1,
                name: "User".to_string(),
                ..SiteLevelRequirement::default()
            },
            SiteLevelRequirement {
                id: 2,
                name: "Power User".to_string(),
                interval: Some("P4W".to_string()),
                uploaded: Some("60GB".to_string()),
                ratio: Some(1.05),
                ..SiteLevelRequirement::default()
            },
            SiteLevelRequirement {
                id: 3,
                name: "Elite User".to_string(),
                interval: Some("P8W".to_string()),
                uploaded: Some("150GB".to_string()),
                ratio: Some(1.55),
                ..SiteLevelRequirement::default()
            },
        ],
        ..SiteDefinition::new(
            "hddolby",
            "HDDolby",
            SiteSchema::HdDolby,
            &["https://www.hddolby.com"],
        )
    })
});

pub(super) fn definition() -> Arc<SiteDefinition> {
    Arc::clone(&DEFINITION)
}
