//! Declarative site definitions consumed by definition-driven drivers.
//!
//! A [`SiteDefinition`] is the unit of extensibility for the whole system:
//! it names the schema, the mirror URLs, the CSS selectors, the user-info
//! request pipeline, and the level ladder for one remote site. Definitions
//! are created by static initialisation, validated, registered once, and
//! never mutated afterwards.

use std::collections::HashMap;

use chrono::{Duration, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::{AuthMethod, DiscountLevel, SiteSchema, UserInfo, parse_size_string};

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z][a-z0-9_-]*$").expect("id pattern compiles"));
static TIMEZONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]\d{4}$").expect("timezone pattern compiles"));

/// Structured errors emitted during definition validation.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// Site id does not match `[a-z][a-z0-9_-]*`.
    #[error("invalid site id '{id}'")]
    InvalidId {
        /// Offending identifier.
        id: String,
    },
    /// A locator is missing or not an absolute http(s) URL.
    #[error("invalid url '{url}' for site '{site}'")]
    InvalidUrl {
        /// Site being validated.
        site: String,
        /// Offending URL.
        url: String,
    },
    /// Timezone offset is not of the form `±HHMM`.
    #[error("invalid timezone offset '{offset}' for site '{site}'")]
    InvalidTimezone {
        /// Site being validated.
        site: String,
        /// Offending offset string.
        offset: String,
    },
    /// A schema-mandated section is missing.
    #[error("site '{site}' ({schema}) requires {section}")]
    MissingSection {
        /// Site being validated.
        site: String,
        /// Schema imposing the requirement.
        schema: SiteSchema,
        /// Missing section description.
        section: &'static str,
    },
    /// Two level-ladder rungs share an id.
    #[error("duplicate level id {level_id} in site '{site}'")]
    DuplicateLevelId {
        /// Site being validated.
        site: String,
        /// Repeated level identifier.
        level_id: u32,
    },
    /// A level interval does not parse as an ISO-8601 duration.
    #[error("invalid interval '{value}' for level {level_id} in site '{site}'")]
    InvalidInterval {
        /// Site being validated.
        site: String,
        /// Level carrying the bad interval.
        level_id: u32,
        /// Offending interval string.
        value: String,
    },
    /// A level size threshold does not parse as `<number><unit>`.
    #[error("invalid size '{value}' for level {level_id} in site '{site}'")]
    InvalidSize {
        /// Site being validated.
        site: String,
        /// Level carrying the bad size.
        level_id: u32,
        /// Offending size string.
        value: String,
    },
}

/// Expected body shape of a pipeline step response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Server-rendered HTML, parsed with CSS selectors.
    #[default]
    Document,
    /// JSON payload, parsed with dot-path selectors.
    Json,
}

/// One request of a multi-step user-info pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Path relative to the site base URL.
    pub path: String,
    /// HTTP method, `GET` unless stated.
    #[serde(default)]
    pub method: String,
    /// Static query parameters.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Static form body fields for POST requests.
    #[serde(default)]
    pub data: HashMap<String, String>,
    /// How the response body should be parsed.
    #[serde(default)]
    pub response_type: ResponseType,
}

/// A named filter invocation inside a field-selector pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCall {
    /// Registered filter name.
    pub name: String,
    /// Positional string arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl FilterCall {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            args: args.iter().map(|&arg| arg.to_string()).collect(),
        }
    }
}

/// Declarative extractor for one user-info field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSelector {
    /// Candidate selectors tried in order until one yields a value. CSS for
    /// document responses, dot-paths for JSON responses.
    pub selectors: Vec<String>,
    /// Attribute to read instead of the element text.
    #[serde(default)]
    pub attr: Option<String>,
    /// Filter pipeline applied left-to-right to the raw value.
    #[serde(default)]
    pub filters: Vec<FilterCall>,
    /// Alternative pipelines keyed by the index of the selector that matched.
    #[serde(default)]
    pub switch_filters: HashMap<usize, Vec<FilterCall>>,
}

impl FieldSelector {
    /// Selector list constructor with no filters.
    #[must_use]
    pub fn css(selectors: &[&str]) -> Self {
        Self {
            selectors: selectors.iter().map(|&sel| sel.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Attach an attribute to read instead of text.
    #[must_use]
    pub fn with_attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = Some(attr.into());
        self
    }

    /// Append a filter to the pipeline.
    #[must_use]
    pub fn with_filter(mut self, name: &str, args: &[&str]) -> Self {
        self.filters.push(FilterCall::new(name, args));
        self
    }

    /// Filter pipeline for the selector at `index`, honouring overrides.
    #[must_use]
    pub fn filters_for(&self, index: usize) -> &[FilterCall] {
        self.switch_filters
            .get(&index)
            .map_or(self.filters.as_slice(), Vec::as_slice)
    }
}

/// One step of the user-info pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfoStep {
    /// Request to issue.
    pub request: RequestConfig,
    /// Values carried forward from earlier steps: target dot-path
    /// (`params.id`, `data.uid`) mapped to the source field name.
    #[serde(default)]
    pub assertions: HashMap<String, String>,
    /// Fields this step extracts from its response.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Multi-step user-info pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfoConfig {
    /// Ordered request steps; executed strictly in declared order.
    pub process: Vec<UserInfoStep>,
    /// Field extractors, keyed by field name.
    #[serde(default)]
    pub selectors: HashMap<String, FieldSelector>,
    /// Fields whose previous snapshot value survives a zero/empty fetch.
    #[serde(default)]
    pub pick_last: Vec<String>,
    /// Milliseconds slept between steps.
    #[serde(default)]
    pub request_delay_ms: u64,
}

/// Configuration for the generic detail-page parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailParserConfig {
    /// `chrono` format string for times on the detail page.
    pub time_layout: String,
    /// CSS class (or token) to discount-level mapping.
    #[serde(default)]
    pub discount_classes: HashMap<String, DiscountLevel>,
    /// Keywords marking a hit-and-run obligation.
    #[serde(default)]
    pub hr_keywords: Vec<String>,
    /// Selector for the release title.
    #[serde(default)]
    pub title_selector: String,
    /// Selector for the torrent id.
    #[serde(default)]
    pub id_selector: String,
    /// Selector for promotion markers, scanned in document order.
    #[serde(default)]
    pub discount_selector: String,
    /// Selector for the promotion end time.
    #[serde(default)]
    pub end_time_selector: String,
    /// Selector for the size cell.
    #[serde(default)]
    pub size_selector: String,
}

/// One rung of a site's user-class ladder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteLevelRequirement {
    /// Rung identifier, unique within the definition.
    pub id: u32,
    /// Display name of the user class.
    pub name: String,
    /// Minimum account age as an ISO-8601 duration (e.g. `P5W`).
    #[serde(default)]
    pub interval: Option<String>,
    /// Minimum uploaded volume as a size string (e.g. `50GB`).
    #[serde(default)]
    pub uploaded: Option<String>,
    /// Minimum downloaded volume as a size string.
    #[serde(default)]
    pub downloaded: Option<String>,
    /// Minimum share ratio.
    #[serde(default)]
    pub ratio: Option<f64>,
    /// Minimum seeding-bonus points.
    #[serde(default)]
    pub seeding_points: Option<f64>,
    /// Minimum number of own uploads.
    #[serde(default)]
    pub uploads: Option<u32>,
    /// Privileges granted at this rung, for display.
    #[serde(default)]
    pub privileges: Option<String>,
}

impl SiteLevelRequirement {
    /// Whether `user` satisfies every threshold of this rung at `now`.
    #[must_use]
    pub fn is_met_by(&self, user: &UserInfo, now: i64) -> bool {
        if let Some(interval) = self.interval.as_deref() {
            let Some(required) = parse_iso8601_duration(interval) else {
                return false;
            };
            if user.join_date <= 0 || now - user.join_date < required.num_seconds() {
                return false;
            }
        }
        if let Some(uploaded) = self.uploaded.as_deref() {
            match parse_size_string(uploaded) {
                Some(min) if user.uploaded >= min => {}
                _ => return false,
            }
        }
        if let Some(downloaded) = self.downloaded.as_deref() {
            match parse_size_string(downloaded) {
                Some(min) if user.downloaded >= min => {}
                _ => return false,
            }
        }
        if let Some(ratio) = self.ratio
            && !user.is_infinite_ratio()
            && user.ratio < ratio
        {
            return false;
        }
        if let Some(points) = self.seeding_points
            && user.seeding_bonus < points
        {
            return false;
        }
        if let Some(uploads) = self.uploads
            && user.uploads < uploads
        {
            return false;
        }
        true
    }
}

/// Position of a user within a site's level ladder.
#[derive(Debug, Clone, Default)]
pub struct LevelPosition {
    /// Highest rung whose requirements the user currently meets.
    pub current: Option<SiteLevelRequirement>,
    /// Next rung above the current one, when the ladder continues.
    pub next: Option<SiteLevelRequirement>,
}

/// Ordered user-class ladder with lookup helpers.
#[derive(Debug, Clone, Default)]
pub struct LevelLadder {
    rungs: Vec<SiteLevelRequirement>,
}

impl LevelLadder {
    /// Build a ladder from a definition's declared requirements.
    #[must_use]
    pub fn new(rungs: Vec<SiteLevelRequirement>) -> Self {
        Self { rungs }
    }

    /// Rungs in declared (ascending) order.
    #[must_use]
    pub fn rungs(&self) -> &[SiteLevelRequirement] {
        &self.rungs
    }

    /// Locate the user's current and next rung at `now` (unix seconds).
    ///
    /// The current rung is the highest one fully met; the next rung is the
    /// one directly above it, regardless of which thresholds remain.
    #[must_use]
    pub fn locate(&self, user: &UserInfo, now: i64) -> LevelPosition {
        let mut current_index = None;
        for (index, rung) in self.rungs.iter().enumerate() {
            if rung.is_met_by(user, now) {
                current_index = Some(index);
            }
        }
        let next = match current_index {
            Some(index) => self.rungs.get(index + 1).cloned(),
            None => self.rungs.first().cloned(),
        };
        LevelPosition {
            current: current_index.and_then(|index| self.rungs.get(index).cloned()),
            next,
        }
    }
}

fn default_rate_limit() -> f64 {
    2.0
}

fn default_rate_burst() -> u32 {
    5
}

fn default_timezone_offset() -> String {
    "+0800".to_string()
}

/// Declarative description of one remote site; immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteDefinition {
    /// Unique lowercase slug.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Alternative names resolving to this definition.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Wire-protocol family.
    pub schema: SiteSchema,
    /// Base URLs, primary first; the remainder are failover mirrors.
    pub urls: Vec<String>,
    /// Retired URLs kept for recognising stored links.
    #[serde(default)]
    pub legacy_urls: Vec<String>,
    /// Favicon URL for display surfaces.
    #[serde(default)]
    pub favicon_url: Option<String>,
    /// Fixed UTC offset of site-rendered times, `±HHMM`.
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset: String,
    /// Authentication mechanism.
    pub auth_method: AuthMethod,
    /// Sustained request rate in requests per second.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    /// Burst allowance on top of the sustained rate.
    #[serde(default = "default_rate_burst")]
    pub rate_burst: u32,
    /// Listing field selectors merged over schema defaults.
    #[serde(default)]
    pub selectors: HashMap<String, String>,
    /// Detail-page parser configuration.
    #[serde(default)]
    pub detail_parser: Option<DetailParserConfig>,
    /// User-info pipeline configuration.
    #[serde(default)]
    pub user_info: Option<UserInfoConfig>,
    /// User-class ladder, ascending.
    #[serde(default)]
    pub level_requirements: Vec<SiteLevelRequirement>,
}

impl SiteDefinition {
    /// Minimal definition with schema defaults; callers fill in the rest
    /// with struct update syntax.
    #[must_use]
    pub fn new(id: &str, name: &str, schema: SiteSchema, urls: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            aliases: Vec::new(),
            schema,
            urls: urls.iter().map(|&url| url.to_string()).collect(),
            legacy_urls: Vec::new(),
            favicon_url: None,
            timezone_offset: default_timezone_offset(),
            auth_method: match schema {
                SiteSchema::NexusPhp => AuthMethod::Cookie,
                SiteSchema::HdDolby => AuthMethod::CookieAndApiKey,
                _ => AuthMethod::ApiKey,
            },
            rate_limit: default_rate_limit(),
            rate_burst: default_rate_burst(),
            selectors: HashMap::new(),
            detail_parser: None,
            user_info: None,
            level_requirements: Vec::new(),
        }
    }

    /// Fixed offset corresponding to [`timezone_offset`].
    ///
    /// Falls back to UTC when the stored offset is malformed, which
    /// validation prevents for registered definitions.
    ///
    /// [`timezone_offset`]: SiteDefinition::timezone_offset
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        parse_fixed_offset(&self.timezone_offset)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("utc offset"))
    }

    /// Level ladder view over the declared requirements.
    #[must_use]
    pub fn level_ladder(&self) -> LevelLadder {
        LevelLadder::new(self.level_requirements.clone())
    }

    /// Validate every declared invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant as a [`DefinitionError`].
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if !ID_PATTERN.is_match(&self.id) {
            return Err(DefinitionError::InvalidId {
                id: self.id.clone(),
            });
        }
        for url in self.urls.iter().chain(&self.legacy_urls) {
            if !is_absolute_http(url) {
                return Err(DefinitionError::InvalidUrl {
                    site: self.id.clone(),
                    url: url.clone(),
                });
            }
        }
        if !TIMEZONE_PATTERN.is_match(&self.timezone_offset) {
            return Err(DefinitionError::InvalidTimezone {
                site: self.id.clone(),
                offset: self.timezone_offset.clone(),
            });
        }
        let has_process = self
            .user_info
            .as_ref()
            .is_some_and(|config| !config.process.is_empty());
        match self.schema {
            SiteSchema::NexusPhp => {
                if self.selectors.is_empty() {
                    return Err(DefinitionError::MissingSection {
                        site: self.id.clone(),
                        schema: self.schema,
                        section: "listing selectors",
                    });
                }
                if !has_process {
                    return Err(DefinitionError::MissingSection {
                        site: self.id.clone(),
                        schema: self.schema,
                        section: "a user-info process with at least one step",
                    });
                }
            }
            SiteSchema::MTorrent => {
                if !has_process {
                    return Err(DefinitionError::MissingSection {
                        site: self.id.clone(),
                        schema: self.schema,
                        section: "a user-info process",
                    });
                }
            }
            _ => {}
        }
        let mut seen = std::collections::HashSet::new();
        for level in &self.level_requirements {
            if !seen.insert(level.id) {
                return Err(DefinitionError::DuplicateLevelId {
                    site: self.id.clone(),
                    level_id: level.id,
                });
            }
            if let Some(interval) = level.interval.as_deref()
                && parse_iso8601_duration(interval).is_none()
            {
                return Err(DefinitionError::InvalidInterval {
                    site: self.id.clone(),
                    level_id: level.id,
                    value: interval.to_string(),
                });
            }
            for size in [level.uploaded.as_deref(), level.downloaded.as_deref()]
                .into_iter()
                .flatten()
            {
                if parse_size_string(size).is_none() {
                    return Err(DefinitionError::InvalidSize {
                        site: self.id.clone(),
                        level_id: level.id,
                        value: size.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn is_absolute_http(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn parse_fixed_offset(offset: &str) -> Option<FixedOffset> {
    if !TIMEZONE_PATTERN.is_match(offset) {
        return None;
    }
    let sign = if offset.starts_with('-') { -1i32 } else { 1 };
    let hours: i32 = offset[1..3].parse().ok()?;
    let minutes: i32 = offset[3..5].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parse an ISO-8601 duration (`PnYnMnWnDTnHnMnS`) into a [`Duration`].
///
/// Years and months are approximated as 365 and 30 days. Returns `None`
/// when the string is not a valid duration or contains no components.
#[must_use]
pub fn parse_iso8601_duration(value: &str) -> Option<Duration> {
    let rest = value.strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) if !time.is_empty() => (date, Some(time)),
        Some(_) => return None,
        None => (rest, None),
    };
    let mut seconds = 0i64;
    let mut components = 0usize;
    let mut consume = |part: &str, units: &[(char, i64)]| -> Option<()> {
        let mut number = String::new();
        for ch in part.chars() {
            if ch.is_ascii_digit() {
                number.push(ch);
                continue;
            }
            let scale = units
                .iter()
                .find_map(|&(unit, scale)| (unit == ch).then_some(scale))?;
            let quantity: i64 = number.parse().ok()?;
            number.clear();
            seconds = seconds.checked_add(quantity.checked_mul(scale)?)?;
            components += 1;
        }
        number.is_empty().then_some(())
    };
    consume(
        date_part,
        &[
            ('Y', 365 * 86_400),
            ('M', 30 * 86_400),
            ('W', 7 * 86_400),
            ('D', 86_400),
        ],
    )?;
    if let Some(time) = time_part {
        consume(time, &[('H', 3_600), ('M', 60), ('S', 1)])?;
    }
    (components > 0).then(|| Duration::seconds(seconds))
}
