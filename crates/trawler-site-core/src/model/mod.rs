//! Portable data model shared by drivers, the search orchestrator, and the
//! user-info service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of wire-protocol families a site can implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteSchema {
    /// Server-rendered PHP application scraped through CSS selectors.
    #[serde(rename = "nexusphp")]
    NexusPhp,
    /// JSON API with `x-api-key` authentication (M-Team family).
    #[serde(rename = "mtorrent")]
    MTorrent,
    /// Gazelle JSON API (`ajax.php`) with cookie or API-key auth.
    Gazelle,
    /// Unit3D JSON API with bearer-token authentication.
    #[serde(rename = "unit3d")]
    Unit3d,
    /// NexusPHP derivative with a JSON API and combined key+cookie auth.
    #[serde(rename = "hddolby")]
    HdDolby,
    /// Rousi JSON API variant.
    Rousi,
}

impl SiteSchema {
    /// Stable lowercase identifier used in configuration and registries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NexusPhp => "nexusphp",
            Self::MTorrent => "mtorrent",
            Self::Gazelle => "gazelle",
            Self::Unit3d => "unit3d",
            Self::HdDolby => "hddolby",
            Self::Rousi => "rousi",
        }
    }
}

impl std::fmt::Display for SiteSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a site authenticates requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Session cookie sent verbatim in the `Cookie` header.
    Cookie,
    /// API key sent via `x-api-key` or a bearer token.
    ApiKey,
    /// Both a cookie and an API key are required.
    CookieAndApiKey,
}

/// Promotion level attached to a torrent listing.
///
/// The merge ordering used by deduplication is exposed through [`rank`];
/// the free predicate is structural and ignores the discount window.
///
/// [`rank`]: DiscountLevel::rank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountLevel {
    /// No promotion; the full download counts.
    #[default]
    None,
    /// Download does not count against the quota.
    Free,
    /// Free download with doubled upload credit.
    #[serde(rename = "2XFREE")]
    TwoXFree,
    /// Doubled upload credit, full download cost.
    #[serde(rename = "2XUP")]
    TwoXUp,
    /// Doubled upload credit, half download cost.
    #[serde(rename = "2X50")]
    TwoX50,
    /// 30% of the download counts.
    #[serde(rename = "PERCENT_30")]
    Percent30,
    /// 50% of the download counts.
    #[serde(rename = "PERCENT_50")]
    Percent50,
    /// 70% of the download counts.
    #[serde(rename = "PERCENT_70")]
    Percent70,
}

impl DiscountLevel {
    /// Whether downloads at this level are entirely free.
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free | Self::TwoXFree)
    }

    /// Fraction of the payload charged against the download quota.
    #[must_use]
    pub const fn download_ratio(self) -> f64 {
        match self {
            Self::None | Self::TwoXUp => 1.0,
            Self::Free | Self::TwoXFree => 0.0,
            Self::Percent30 => 0.3,
            Self::Percent50 | Self::TwoX50 => 0.5,
            Self::Percent70 => 0.7,
        }
    }

    /// Multiplier applied to upload credit.
    #[must_use]
    pub const fn upload_ratio(self) -> f64 {
        match self {
            Self::TwoXFree | Self::TwoXUp | Self::TwoX50 => 2.0,
            _ => 1.0,
        }
    }

    /// Total preference order used when merging duplicate listings.
    ///
    /// `None < Percent30 < Percent50 < Percent70 < TwoXUp < TwoX50 < Free <
    /// TwoXFree`; higher is better.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Percent30 => 1,
            Self::Percent50 => 2,
            Self::Percent70 => 3,
            Self::TwoXUp => 4,
            Self::TwoX50 => 5,
            Self::Free => 6,
            Self::TwoXFree => 7,
        }
    }
}

/// One row of a site search result, normalised across schemas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentItem {
    /// Site-local torrent identifier.
    pub id: String,
    /// Release title.
    pub title: String,
    /// Secondary title or description line, when the site provides one.
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// Current seeder count.
    pub seeders: u32,
    /// Current leecher count.
    pub leechers: u32,
    /// Completed snatch count.
    pub snatched: u32,
    /// Active promotion level.
    #[serde(default)]
    pub discount_level: DiscountLevel,
    /// Unix timestamp at which the promotion lapses, when bounded.
    #[serde(default)]
    pub discount_end_time: Option<i64>,
    /// Site category label.
    #[serde(default)]
    pub category: String,
    /// Site tags in first-seen order, without duplicates.
    #[serde(default)]
    pub tags: Vec<String>,
    /// 40-character lowercase hex info-hash, or empty when unknown.
    #[serde(default)]
    pub info_hash: String,
    /// Detail page URL.
    #[serde(default)]
    pub url: String,
    /// Direct `.torrent` download URL.
    #[serde(default)]
    pub download_url: String,
    /// Magnet URI, when the site exposes one.
    #[serde(default)]
    pub magnet: String,
    /// Upload time as unix seconds.
    pub uploaded_at: i64,
    /// Whether the torrent carries a hit-and-run obligation.
    #[serde(default)]
    pub has_hr: bool,
    /// Identifier of the site the row came from; filled by the site wrapper.
    #[serde(default)]
    pub source_site: String,
}

impl TorrentItem {
    /// Structural free predicate: true for `FREE` and `2XFREE` regardless of
    /// any promotion window.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.discount_level.is_free()
    }

    /// Whether the promotion window is still open at `now`.
    ///
    /// A torrent with no end time has an unbounded promotion.
    #[must_use]
    pub fn is_discount_active(&self, now: DateTime<Utc>) -> bool {
        if self.discount_level == DiscountLevel::None {
            return false;
        }
        self.discount_end_time
            .is_none_or(|end| end > now.timestamp())
    }

    /// Append a tag, preserving first-seen order and skipping duplicates.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !tag.is_empty() && !self.tags.iter().any(|existing| existing == &tag) {
            self.tags.push(tag);
        }
    }
}

/// Sortable listing columns accepted by site search endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Sort by upload time.
    UploadedAt,
    /// Sort by payload size.
    Size,
    /// Sort by seeder count.
    Seeders,
    /// Sort by leecher count.
    Leechers,
    /// Sort by snatch count.
    Snatched,
}

/// Listing sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Descending order (most first).
    #[default]
    Desc,
    /// Ascending order.
    Asc,
}

/// Neutral search request consumed by every driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text keyword; empty requests the latest listing.
    #[serde(default)]
    pub keyword: String,
    /// Site category filter, when supported.
    #[serde(default)]
    pub category: Option<String>,
    /// Zero-based result page.
    #[serde(default)]
    pub page: i32,
    /// Rows per page; zero lets the site choose.
    #[serde(default)]
    pub page_size: i32,
    /// Restrict to freeleech torrents.
    #[serde(default)]
    pub free_only: bool,
    /// Restrict to torrents without a hit-and-run obligation.
    #[serde(default)]
    pub hr_free: bool,
    /// Minimum seeder count.
    #[serde(default)]
    pub min_seeders: u32,
    /// Requested sort column.
    #[serde(default)]
    pub sort_by: Option<SortField>,
    /// Requested sort direction.
    #[serde(default)]
    pub order: SortOrder,
    /// Lower bound on upload time, when supported by the site.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Upper bound on upload time, when supported by the site.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl SearchQuery {
    /// Convenience constructor for a keyword search with defaults.
    #[must_use]
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Self::default()
        }
    }

    /// Validate caller-supplied arguments before any I/O happens.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SiteError::InvalidQuery`] when `page` or `page_size`
    /// is negative.
    pub fn validate(&self) -> crate::SiteResult<()> {
        if self.page < 0 {
            return Err(crate::SiteError::InvalidQuery {
                reason: format!("page must not be negative, got {}", self.page),
            });
        }
        if self.page_size < 0 {
            return Err(crate::SiteError::InvalidQuery {
                reason: format!("page_size must not be negative, got {}", self.page_size),
            });
        }
        Ok(())
    }
}

/// Per-site account snapshot produced by the user-info pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    /// Site identifier the snapshot belongs to.
    pub site: String,
    /// Site-local user identifier.
    #[serde(default)]
    pub user_id: String,
    /// Display name.
    #[serde(default)]
    pub username: String,
    /// Identifier of the user class within the site's level ladder.
    #[serde(default)]
    pub level_id: String,
    /// Display name of the user class.
    #[serde(default)]
    pub level_name: String,
    /// Total uploaded bytes.
    #[serde(default)]
    pub uploaded: u64,
    /// Total downloaded bytes.
    #[serde(default)]
    pub downloaded: u64,
    /// Upload/download ratio; negative values encode an infinite ratio.
    #[serde(default)]
    pub ratio: f64,
    /// Current bonus-point balance.
    #[serde(default)]
    pub bonus: f64,
    /// Bonus points accrued per hour.
    #[serde(default)]
    pub bonus_per_hour: f64,
    /// Seeding-bonus balance for sites that track it separately.
    #[serde(default)]
    pub seeding_bonus: f64,
    /// Number of torrents currently seeding.
    #[serde(default)]
    pub seeding: u32,
    /// Total size of the seeding set in bytes.
    #[serde(default)]
    pub seeding_size: u64,
    /// Number of torrents currently leeching.
    #[serde(default)]
    pub leeching: u32,
    /// Total size of the leeching set in bytes.
    #[serde(default)]
    pub leeching_size: u64,
    /// Number of uploads credited to the account.
    #[serde(default)]
    pub uploads: u32,
    /// Unread private/system message count.
    #[serde(default)]
    pub unread_message_count: u32,
    /// Account creation time as unix seconds.
    #[serde(default)]
    pub join_date: i64,
    /// Last recorded site access as unix seconds.
    #[serde(default)]
    pub last_access: i64,
    /// Time this snapshot was taken, unix seconds.
    #[serde(default)]
    pub last_update: i64,
}

impl UserInfo {
    /// Whether the ratio field carries the infinity sentinel.
    #[must_use]
    pub fn is_infinite_ratio(&self) -> bool {
        self.ratio < 0.0
    }
}

/// Fold of a set of [`UserInfo`] rows across sites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStats {
    /// Sum of uploaded bytes.
    pub total_uploaded: u64,
    /// Sum of downloaded bytes.
    pub total_downloaded: u64,
    /// Sum of seeding torrent counts.
    pub total_seeding: u64,
    /// Sum of seeding set sizes in bytes.
    pub total_seeding_size: u64,
    /// Sum of leeching torrent counts.
    pub total_leeching: u64,
    /// Sum of bonus balances.
    pub total_bonus: f64,
    /// Number of site snapshots folded in.
    pub site_count: usize,
    /// Arithmetic mean over finite ratios only.
    pub average_ratio: f64,
}

impl AggregatedStats {
    /// Fold the provided snapshots into aggregate totals.
    ///
    /// Infinite-ratio sentinels are excluded from the average.
    #[must_use]
    pub fn aggregate<'a>(rows: impl IntoIterator<Item = &'a UserInfo>) -> Self {
        let mut stats = Self::default();
        let mut finite_ratios = 0usize;
        let mut ratio_sum = 0.0f64;
        for row in rows {
            stats.total_uploaded += row.uploaded;
            stats.total_downloaded += row.downloaded;
            stats.total_seeding += u64::from(row.seeding);
            stats.total_seeding_size += row.seeding_size;
            stats.total_leeching += u64::from(row.leeching);
            stats.total_bonus += row.bonus;
            stats.site_count += 1;
            if !row.is_infinite_ratio() {
                ratio_sum += row.ratio;
                finite_ratios += 1;
            }
        }
        if finite_ratios > 0 {
            #[allow(clippy::cast_precision_loss)]
            {
                stats.average_ratio = ratio_sum / finite_ratios as f64;
            }
        }
        stats
    }
}

/// Parse a `<number><unit>` size string into bytes.
///
/// Units are case-insensitive and binary (`KB` = 1024 bytes); `KiB`-style
/// spellings are accepted. Returns `None` when the string does not match.
#[must_use]
pub fn parse_size_string(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    let split = trimmed.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number.trim().parse().ok()?;
    if number < 0.0 {
        return None;
    }
    let multiplier: f64 = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" | "KIB" | "K" => 1024.0,
        "MB" | "MIB" | "M" => 1024.0 * 1024.0,
        "GB" | "GIB" | "G" => 1024.0 * 1024.0 * 1024.0,
        "TB" | "TIB" | "T" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bytes = (number * multiplier).round() as u64;
    Some(bytes)
}

/// Render a byte count with a binary unit suffix, e.g. `1.50 GB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_predicate_matches_spec_levels() {
        assert!(DiscountLevel::Free.is_free());
        assert!(DiscountLevel::TwoXFree.is_free());
        for level in [
            DiscountLevel::None,
            DiscountLevel::TwoXUp,
            DiscountLevel::TwoX50,
            DiscountLevel::Percent30,
            DiscountLevel::Percent50,
            DiscountLevel::Percent70,
        ] {
            assert!(!level.is_free(), "{level:?} must not be free");
        }
    }

    #[test]
    fn download_ratio_is_one_of_documented_values() {
        let allowed = [0.0, 0.3, 0.5, 0.7, 1.0];
        for level in [
            DiscountLevel::None,
            DiscountLevel::Free,
            DiscountLevel::TwoXFree,
            DiscountLevel::TwoXUp,
            DiscountLevel::TwoX50,
            DiscountLevel::Percent30,
            DiscountLevel::Percent50,
            DiscountLevel::Percent70,
        ] {
            let ratio = level.download_ratio();
            assert!(
                allowed.iter().any(|v| (*v - ratio).abs() < f64::EPSILON),
                "{level:?} produced unexpected ratio {ratio}"
            );
        }
    }

    #[test]
    fn discount_rank_orders_merge_preference() {
        let ordered = [
            DiscountLevel::None,
            DiscountLevel::Percent30,
            DiscountLevel::Percent50,
            DiscountLevel::Percent70,
            DiscountLevel::TwoXUp,
            DiscountLevel::TwoX50,
            DiscountLevel::Free,
            DiscountLevel::TwoXFree,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn discount_window_checks_end_time() {
        let now = Utc::now();
        let mut item = TorrentItem {
            discount_level: DiscountLevel::Free,
            ..TorrentItem::default()
        };
        assert!(item.is_discount_active(now), "unbounded window is active");
        item.discount_end_time = Some(now.timestamp() + 3600);
        assert!(item.is_discount_active(now));
        item.discount_end_time = Some(now.timestamp() - 1);
        assert!(!item.is_discount_active(now));
        item.discount_level = DiscountLevel::None;
        item.discount_end_time = None;
        assert!(!item.is_discount_active(now));
    }

    #[test]
    fn tags_preserve_insertion_order_without_duplicates() {
        let mut item = TorrentItem::default();
        item.add_tag("official");
        item.add_tag("中字");
        item.add_tag("official");
        item.add_tag("");
        assert_eq!(item.tags, vec!["official".to_string(), "中字".to_string()]);
    }

    #[test]
    fn query_validation_rejects_negative_paging() {
        let mut query = SearchQuery::keyword("ubuntu");
        assert!(query.validate().is_ok());
        query.page = -1;
        assert!(query.validate().is_err());
        query.page = 0;
        query.page_size = -5;
        assert!(query.validate().is_err());
    }

    #[test]
    fn aggregation_skips_infinite_ratios() {
        let rows = vec![
            UserInfo {
                site: "a".into(),
                uploaded: 100,
                downloaded: 50,
                ratio: 2.0,
                seeding: 3,
                bonus: 10.0,
                ..UserInfo::default()
            },
            UserInfo {
                site: "b".into(),
                uploaded: 200,
                downloaded: 0,
                ratio: -1.0,
                seeding: 1,
                bonus: 5.0,
                ..UserInfo::default()
            },
            UserInfo {
                site: "c".into(),
                uploaded: 300,
                downloaded: 100,
                ratio: 3.0,
                ..UserInfo::default()
            },
        ];
        let stats = AggregatedStats::aggregate(&rows);
        assert_eq!(stats.site_count, 3);
        assert_eq!(stats.total_uploaded, 600);
        assert_eq!(stats.total_downloaded, 150);
        assert_eq!(stats.total_seeding, 4);
        assert!((stats.total_bonus - 15.0).abs() < f64::EPSILON);
        assert!((stats.average_ratio - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn size_strings_parse_with_case_insensitive_units() {
        assert_eq!(parse_size_string("1024B"), Some(1024));
        assert_eq!(parse_size_string("1KB"), Some(1024));
        assert_eq!(parse_size_string("1.5 gb"), Some(1_610_612_736));
        assert_eq!(parse_size_string("2TiB"), Some(2_199_023_255_552));
        assert_eq!(parse_size_string("50GB"), Some(53_687_091_200));
        assert_eq!(parse_size_string("12 parsecs"), None);
        assert_eq!(parse_size_string(""), None);
    }

    #[test]
    fn bytes_format_round_numbers() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_610_612_736), "1.50 GB");
    }

    #[test]
    fn discount_serialises_to_wire_names() {
        let json = serde_json::to_string(&DiscountLevel::TwoXFree).expect("serialise");
        assert_eq!(json, "\"2XFREE\"");
        let back: DiscountLevel = serde_json::from_str("\"PERCENT_50\"").expect("deserialise");
        assert_eq!(back, DiscountLevel::Percent50);
    }
}
