//! HDSky: NexusPHP, cookie auth, Chinese HD tracker.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use trawler_site_core::{
    DetailParserConfig, DiscountLevel, FieldSelector, RequestConfig, SiteDefinition,
    SiteLevelRequirement, SiteSchema, UserInfoConfig, UserInfoStep,
};

static DEFINITION: Lazy<Arc<SiteDefinition>> = Lazy::new(|| {
    let selectors: HashMap<String, String> = [
        ("rows", "table.torrents > tbody > tr"),
        ("link", "table.torrentname a[href*='details.php']"),
        ("title", "table.torrentname a[href*='details.php'] b"),
        ("subtitle", "table.torrentname td.embedded font.subtitle"),
        ("download", "a[href*='download.php']"),
        ("category", "td:nth-child(1) img"),
        ("date", "td:nth-child(4) span[title]"),
        ("size", "td:nth-child(5)"),
        ("seeders", "td:nth-child(6)"),
        ("leechers", "td:nth-child(7)"),
        ("snatched", "td:nth-child(8)"),
        ("discount", "table.torrentname img[class*='pro_']"),
        ("discount_end", "table.torrentname span[title]"),
        ("hr", "img.hitandrun"),
        ("tags", "table.torrentname span.tags"),
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
        FieldSelector::css(&["a[href*='userdetails.php'] b", "a[href*='userdetails.php']"]),
    );
    field_selectors.insert(
        "unread".to_string(),
        FieldSelector::css(&["a[href*='messages.php'] b"])
            .with_filter("sumRegexMatches", &[r"(\d+)"]),
    );
    field_selectors.insert(
        "uploaded".to_string(),
        FieldSelector::css(&["img.arrowup[alt='uploaded'] ~ span", "td.rowfollow.uploaded"])
            .with_filter("parseSize", &[]),
    );
    field_selectors.insert(
        "downloaded".to_string(),
        FieldSelector::css(&["img.arrowdown[alt='downloaded'] ~ span", "td.rowfollow.downloaded"])
            .with_filter("parseSize", &[]),
    );
    field_selectors.insert(
        "ratio".to_string(),
        FieldSelector::css(&["font.color_ratio + *", "td.rowfollow.ratio"])
            .with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "bonus".to_string(),
        FieldSelector::css(&["td#bonus", "a[href*='mybonus.php']"])
            .with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "bonus_per_hour".to_string(),
        FieldSelector::css(&["div#outer td.text span.medium"])
            .with_filter("regex", &[r"([\d.,]+)\s*个魔力值"])
            .with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "level_name".to_string(),
        FieldSelector::css(&["tr.userclass img"]).with_attr("alt"),
    );
    field_selectors.insert(
        "join_date".to_string(),
        FieldSelector::css(&["td.rowfollow span[title]"])
            .with_attr("title")
            .with_filter("parseTime", &["+0800"]),
    );
    field_selectors.insert(
        "seeding".to_string(),
        FieldSelector::css(&["img.arrowup + span"]).with_filter("parseNumber", &[]),
    );
    field_selectors.insert(
        "leeching".to_string(),
        FieldSelector::css(&["img.arrowdown + span"]).with_filter("parseNumber", &[]),
    );

    let mut detail_classes = HashMap::new();
    detail_classes.insert("pro_free".to_string(), DiscountLevel::Free);
    detail_classes.insert("pro_free2up".to_string(), DiscountLevel::TwoXFree);
    detail_classes.insert("pro_2up".to_string(), DiscountLevel::TwoXUp);
    detail_classes.insert("pro_50pctdown".to_string(), DiscountLevel::Percent50);
    detail_classes.insert("pro_50pctdown2up".to_string(), DiscountLevel::TwoX50);
    detail_classes.insert("pro_30pctdown".to_string(), DiscountLevel::Percent30);

    Arc::new(SiteDefinition {
        aliases: vec!["HDSky".to_string(), "天空".to_string()],
        selectors,
        favicon_url: Some("https://hdsky.me/favicon.ico".to_string()),
        detail_parser: Some(DetailParserConfig {
            time_layout: "%Y-%m-%d %H:%M:%S".to_string(),
            discount_classes: detail_classes,
            hr_keywords: vec!["H&R".to_string(), "考核".to_string()],
            title_selector: "h1#top".to_string(),
            id_selector: "input[name='id']".to_string(),
            discount_selector: "h1#top img".to_string(),
            end_time_selector: "h1#top span[title]".to_string(),
            size_selector: "td.rowfollow".to_string(),
        }),
        user_info: Some(UserInfoConfig {
            process: vec![
                UserInfoStep {
                    request: RequestConfig {
                        path: "index.php".to_string(),
                        ..RequestConfig::default()
                    },
                    assertions: HashMap::new(),
                    fields: vec![
                        "id".to_string(),
                        "username".to_string(),
                        "unread".to_string(),
                    ],
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
                        "bonus_per_hour".to_string(),
                        "level_name".to_string(),
                        "join_date".to_string(),
                        "seeding".to_string(),
                        "leeching".to_string(),
                    ],
                },
            ],
            selectors: field_selectors,
            pick_last: vec![
                "uploaded".to_string(),
                "downloaded".to_string(),
                "ratio".to_string(),
                "bonus".to_string(),
            ],
            request_delay_ms: 500,
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
                uploaded: Some("50GB".to_string()),
                ratio: Some(1.05),
                ..SiteLevelRequirement::default()
            },
            SiteLevelRequirement {
                id: 3,
                name: "Elite User".to_string(),
                interval: Some("P8W".to_string()),
                uploaded: Some("120GB".to_string()),
                ratio: Some(1.55),
                ..SiteLevelRequirement::default()
            },
            SiteLevelRequirement {
                id: 4,
                name: "Crazy User".to_string(),
                interval: Some("P15W".to_string()),
                uploaded: Some("300GB".to_string()),
                ratio: Some(2.05),
                ..SiteLevelRequirement::default()
            },
        ],
        ..SiteDefinition::new(
            "hdsky",
            "HDSky",
            SiteSchema::NexusPhp,
            &["https://hdsky.me", "https://hdsky.moe"],
        )
    })
});

pub(super) fn definition() -> Arc<SiteDefinition> {
    Arc::clone(&DEFINITION)
}
