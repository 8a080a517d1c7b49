//! M-Team: mTorrent JSON API, `x-api-key` auth.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use trawler_site_core::{
    FieldSelector, RequestConfig, ResponseType, SiteDefinition, SiteLevelRequirement, SiteSchema,
    UserInfoConfig, UserInfoStep,
};

static DEFINITION: Lazy<Arc<SiteDefinition>> = Lazy::new(|| {
    let mut field_selectors = HashMap::new();
    field_selectors.insert("id".to_string(), FieldSelector::css(&["data.id"]));
    field_selectors.insert(
        "username".to_string(),
        FieldSelector::css(&["data.username"]),
    );
    field_selectors.insert(
        "uploaded".to_string(),
        FieldSelector::css(&["data.memberCount.uploaded"]).with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "downloaded".to_string(),
        FieldSelector::css(&["data.memberCount.downloaded"]).with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "ratio".to_string(),
        FieldSelector::css(&["data.memberCount.shareRate"]).with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "bonus".to_string(),
        FieldSelector::css(&["data.memberCount.bonus"]).with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "level_name".to_string(),
        FieldSelector::css(&["data.role"]),
    );
    field_selectors.insert(
        "join_date".to_string(),
        FieldSelector::css(&["data.createdDate"]).with_filter("parseTime", &["+0800"]),
    );

    Arc::new(SiteDefinition {
        aliases: vec!["M-Team".to_string(), "馒头".to_string()],
        favicon_url: Some("https://kp.m-team.cc/favicon.ico".to_string()),
        rate_limit: 1.0,
        rate_burst: 3,
        user_info: Some(UserInfoConfig {
            process: vec![UserInfoStep {
                request: RequestConfig {
                    path: "api/member/profile".to_string(),
                    method: "POST".to_string(),
                    response_type: ResponseType::Json,
                    ..RequestConfig::default()
                },
                assertions: HashMap::new(),
                fields: vec![
                    "id".to_string(),
                    "username".to_string(),
                    "uploaded".to_string(),
                    "downloaded".to_string(),
                    "ratio".to_string(),
                    "bonus".to_string(),
                    "level_name".to_string(),
                    "join_date".to_string(),
                ],
            }],
            selectors: field_selectors,
            pick_last: vec![
                "uploaded".to_string(),
                "downloaded".to_string(),
                "ratio".to_string(),
            ],
            request_delay_ms: 0,
        }),
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
                uploaded: Some("200GB".to_string()),
                ratio: Some(2.0),
                ..SiteLevelRequirement::default()
            },
            SiteLevelRequirement {
                id: 3,
                name: "Elite User".to_string(),
                interval: Some("P8W".to_string()),
                uploaded: Some("500GB".to_string()),
                ratio: Some(3.0),
                ..SiteLevelRequirement::default()
            },
        ],
        ..SiteDefinition::new(
            "mteam",
            "M-Team",
            SiteSchema::MTorrent,
            &["https://kp.m-team.cc", "https://xp.m-team.cc"],
        )
    })
});

pub(super) fn definition() -> Arc<SiteDefinition> {
    Arc::clone(&DEFINITION)
}
