//! OurBits: NexusPHP, cookie auth.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use trawler_site_core::{
    FieldSelector, RequestConfig, SiteDefinition, SiteLevelRequirement, SiteSchema,
    UserInfoConfig, UserInfoStep,
};

static DEFINITION: Lazy<Arc<SiteDefinition>> = Lazy::new(|| {
    let selectors: HashMap<String, String> = [
        ("rows", "table.torrents > tbody > tr"),
        ("link", "a[href*='details.php']"),
        ("title", "a[href*='details.php'] b"),
        ("subtitle", "div.torrent-smalldescr span"),
        ("download", "a[href*='download.php']"),
        ("category", "td:nth-child(1) img"),
        ("date", "td:nth-child(4) span[title]"),
        ("size", "td:nth-child(5)"),
        ("seeders", "td:nth-child(6)"),
        ("leechers", "td:nth-child(7)"),
        ("snatched", "td:nth-child(8)"),
        ("discount", "img[class*='pro_']"),
        ("discount_end", "span[title]"),
        ("hr", "img.hitandrun"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect();

    let mut field_selectors = HashMap::new();
    field_selectors.insert(
        "id".to_string(),
        FieldSelector::css(&["a[href*='userdetails.php']"])
            .with_attr("href")
            .with_filter("querystring", &["id"]),
    );
    field_selectors.insert(
        "username".to_string(),
        FieldSelector::css(&["a[href*='userdetails.php'] b"]),
    );
    field_selectors.insert(
        "uploaded".to_string(),
        FieldSelector::css(&["img.arrowup ~ span"]).with_filter("parseSize", &[]),
    );
    field_selectors.insert(
        "downloaded".to_string(),
        FieldSelector::css(&["img.arrowdown ~ span"]).with_filter("parseSize", &[]),
    );
    field_selectors.insert(
        "ratio".to_string(),
        FieldSelector::css(&["font.color_ratio + font"]).with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "bonus".to_string(),
        FieldSelector::css(&["a[href*='mybonus.php']"]).with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "level_name".to_string(),
        FieldSelector::css(&["tr.userclass img"]).with_attr("alt"),
    );
    field_selectors.insert(
        "join_date".to_string(),
        FieldSelector::css(&["td.joindate span[title]"])
            .with_attr("title")
            .with_filter("parseTime", &["+0800"]),
    );

    Arc::new(SiteDefinition {
        aliases: vec!["OurBits".to_string(), "我堡".to_string()],
        selectors,
        favicon_url: Some("https://ourbits.club/favicon.ico".to_string()),
        user_info: Some(UserInfoConfig {
            process: vec![
                UserInfoStep {
                    request: RequestConfig {
                        path: "index.php".to_string(),
                        ..RequestConfig::default()
                    },
                    assertions: HashMap::new(),
                    fields: vec!["id".to_string(), "username".to_string()],
                },
                UserInfoStep {
                    request: RequestConfig {
                        path: "userdetails.php".to_string(),
                        ..RequestConfig::default()
                    },
                    assertions: HashMap::from([("params.id".to_string(), "id".to_string())]),
                    fields: vec![
                        "uploaded".to_string(),
                        "downloaded".to_string(),
                        "ratio".to_string(),
                        "bonus".to_string(),
                        "level_name".to_string(),
                        "join_date".to_string(),
                    ],
                },
            ],
            selectors: field_selectors,
            pick_last: vec!["uploaded".to_string(), "downloaded".to_string()],
            request_delay_ms: 300,
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
                interval: Some("P5W".to_string()),
                uploaded: Some("100GB".to_string()),
                ratio: Some(1.05),
                ..SiteLevelRequirement::default()
            },
            SiteLevelRequirement {
                id: 3,
                name: "Elite User".to_string(),
                interval: Some("P10W".to_string()),
                uploaded: Some("350GB".to_string()),
                ratio: Some(1.55),
                ..SiteLevelRequirement::default()
            },
        ],
        ..SiteDefinition::new(
            "ourbits",
            "OurBits",
            SiteSchema::NexusPhp,
            &["https://ourbits.club"],
        )
    })
});

pub(super) fn definition() -> Arc<SiteDefinition> {
    Arc::clone(&DEFINITION)
}
