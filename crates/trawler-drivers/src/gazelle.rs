//! Driver for Gazelle-family sites: the `ajax.php` JSON API with either
//! session-cookie or API-key authentication.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use trawler_site_core::{
    DiscountLevel, DriverContext, DriverRequest, DriverResponse, HttpExecutor, SearchQuery,
    SiteDefinition, SiteDriver, SiteError, SiteResult, TorrentItem, UserInfo,
};
use trawler_torrent::is_torrent_content_type;

use crate::de::{flexible_f64, flexible_u32, flexible_u64};

/// Gazelle schema driver.
pub struct GazelleDriver {
    definition: Arc<SiteDefinition>,
    site_id: String,
    cookie: Option<String>,
    api_key: Option<String>,
    http: Arc<dyn HttpExecutor>,
}

/// Driver constructor registered for the `gazelle` schema.
///
/// # Errors
///
/// Returns [`SiteError::InvalidCredentials`] when neither a cookie nor an
/// API key is configured.
pub(crate) fn create(context: DriverContext) -> SiteResult<Arc<dyn SiteDriver>> {
    let DriverContext {
        definition,
        config,
        http,
    } = context;
    let cookie = config.option_str("cookie").map(str::to_string);
    let api_key = config.option_str("apiKey").map(str::to_string);
    if cookie.is_none() && api_key.is_none() {
        return Err(SiteError::InvalidCredentials {
            site: config.id,
            detail: "gazelle sites need either 'cookie' or 'apiKey'".to_string(),
        });
    }
    Ok(Arc::new(GazelleDriver {
        site_id: config.id,
        cookie,
        api_key,
        definition,
        http,
    }))
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: String,
    response: Option<T>,
}

#[derive(Deserialize)]
struct BrowseResponse {
    #[serde(default)]
    results: Vec<BrowseGroup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowseGroup {
    #[serde(deserialize_with = "flexible_u64", default)]
    group_id: u64,
    #[serde(default)]
    group_name: String,
    #[serde(deserialize_with = "flexible_u64", default)]
    torrent_id: u64,
    #[serde(deserialize_with = "flexible_u64", default)]
    size: u64,
    #[serde(deserialize_with = "flexible_u32", default)]
    seeders: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    leechers: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    snatches: u32,
    #[serde(default)]
    is_freeleech: bool,
    #[serde(default)]
    is_neutral_leech: bool,
    #[serde(default)]
    is_personal_freeleech: bool,
    #[serde(deserialize_with = "flexible_u64", default)]
    group_time: u64,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    torrents: Vec<GroupTorrent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupTorrent {
    #[serde(deserialize_with = "flexible_u64", default)]
    torrent_id: u64,
    #[serde(deserialize_with = "flexible_u64", default)]
    size: u64,
    #[serde(deserialize_with = "flexible_u32", default)]
    seeders: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    leechers: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    snatches: u32,
    #[serde(default)]
    is_freeleech: bool,
    #[serde(default)]
    is_neutral_leech: bool,
    #[serde(default)]
    is_personal_freeleech: bool,
    #[serde(deserialize_with = "flexible_u64", default)]
    time: u64,
}

#[derive(Deserialize)]
struct IndexResponse {
    #[serde(deserialize_with = "flexible_u64", default)]
    id: u64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    notifications: Option<Notifications>,
    #[serde(default)]
    userstats: Option<UserStats>,
}

#[derive(Deserialize)]
struct Notifications {
    #[serde(deserialize_with = "flexible_u32", default)]
    messages: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserStats {
    #[serde(deserialize_with = "flexible_u64", default)]
    uploaded: u64,
    #[serde(deserialize_with = "flexible_u64", default)]
    downloaded: u64,
    #[serde(deserialize_with = "flexible_f64", default)]
    ratio: f64,
    #[serde(default)]
    class: String,
}

const fn leech_level(freeleech: bool, neutral: bool, personal: bool) -> DiscountLevel {
    if freeleech || neutral || personal {
        DiscountLevel::Free
    } else {
        DiscountLevel::None
    }
}

impl GazelleDriver {
    fn with_auth(&self, mut request: DriverRequest) -> DriverRequest {
        if let Some(cookie) = &self.cookie {
            request = request.with_header("Cookie", cookie.clone());
        }
        if let Some(api_key) = &self.api_key {
            request = request.with_header("Authorization", api_key.clone());
        }
        request
    }

    fn decode<T: for<'de> Deserialize<'de>>(
        &self,
        response: &DriverResponse,
        what: &'static str,
    ) -> SiteResult<T> {
        let envelope: Envelope<T> =
            serde_json::from_slice(&response.body).map_err(|_| SiteError::Parse {
                site: self.site_id.clone(),
                what,
                snippet: response.snippet(),
            })?;
        if envelope.status != "success" {
            return Err(SiteError::Parse {
                site: self.site_id.clone(),
                what,
                snippet: response.snippet(),
            });
        }
        envelope.response.ok_or_else(|| SiteError::Parse {
            site: self.site_id.clone(),
            what,
            snippet: response.snippet(),
        })
    }
}

#[async_trait]
impl SiteDriver for GazelleDriver {
    fn definition(&self) -> &Arc<SiteDefinition> {
        &self.definition
    }

    fn prepare_search(&self, query: &SearchQuery) -> SiteResult<DriverRequest> {
        let mut request = DriverRequest::get("ajax.php")
            .with_query("action", "browse")
            .with_query("searchstr", &query.keyword);
        if query.page > 0 {
            request = request.with_query("page", (query.page + 1).to_string());
        }
        if query.free_only {
            request = request.with_query("freetorrent", "1");
        }
        Ok(self.with_auth(request))
    }

    async fn execute(&self, request: DriverRequest) -> SiteResult<DriverResponse> {
        self.http.execute(&self.site_id, request).await
    }

    fn parse_search(&self, response: &DriverResponse) -> SiteResult<Vec<TorrentItem>> {
        let browse: BrowseResponse = self.decode(response, "search listing")?;
        let mut items = Vec::new();
        for group in browse.results {
            if group.torrents.is_empty() {
                let mut item = TorrentItem {
                    id: group.torrent_id.to_string(),
                    title: group.group_name.clone(),
                    size_bytes: group.size,
                    seeders: group.seeders,
                    leechers: group.leechers,
                    snatched: group.snatches,
                    discount_level: leech_level(
                        group.is_freeleech,
                        group.is_neutral_leech,
                        group.is_personal_freeleech,
                    ),
                    url: format!("torrents.php?torrentid={}", group.torrent_id),
                    uploaded_at: i64::try_from(group.group_time).unwrap_or_default(),
                    ..TorrentItem::default()
                };
                for tag in &group.tags {
                    item.add_tag(tag.clone());
                }
                items.push(item);
                continue;
            }
            for torrent in &group.torrents {
                let mut item = TorrentItem {
                    id: torrent.torrent_id.to_string(),
                    title: group.group_name.clone(),
                    size_bytes: torrent.size,
                    seeders: torrent.seeders,
                    leechers: torrent.leechers,
                    snatched: torrent.snatches,
                    discount_level: leech_level(
                        torrent.is_freeleech,
                        torrent.is_neutral_leech,
                        torrent.is_personal_freeleech,
                    ),
                    url: format!(
                        "torrents.php?id={}&torrentid={}",
                        group.group_id, torrent.torrent_id
                    ),
                    uploaded_at: i64::try_from(torrent.time).unwrap_or_default(),
                    ..TorrentItem::default()
                };
                for tag in &group.tags {
                    item.add_tag(tag.clone());
                }
                items.push(item);
            }
        }
        Ok(items)
    }

    fn prepare_download(&self, item: &TorrentItem) -> SiteResult<DriverRequest> {
        let request = DriverRequest::get("ajax.php")
            .with_query("action", "download")
            .with_query("id", &item.id);
        Ok(self.with_auth(request))
    }

    fn parse_download(&self, response: &DriverResponse) -> SiteResult<Vec<u8>> {
        let content_ok = response
            .content_type
            .as_deref()
            .is_some_and(is_torrent_content_type);
        if content_ok || response.body.first() == Some(&b'd') {
            return Ok(response.body.clone());
        }
        Err(SiteError::Parse {
            site: self.site_id.clone(),
            what: "torrent payload",
            snippet: response.snippet(),
        })
    }

    fn prepare_user_info(&self) -> SiteResult<DriverRequest> {
        Ok(self.with_auth(DriverRequest::get("ajax.php").with_query("action", "index")))
    }

    fn parse_user_info(&self, response: &DriverResponse) -> SiteResult<UserInfo> {
        let index: IndexResponse = self.decode(response, "user info")?;
        let stats = index.userstats.unwrap_or(UserStats {
            uploaded: 0,
            downloaded: 0,
            ratio: 0.0,
            class: String::new(),
        });
        Ok(UserInfo {
            site: self.site_id.clone(),
            user_id: index.id.to_string(),
            username: index.username,
            level_name: stats.class,
            uploaded: stats.uploaded,
            downloaded: stats.downloaded,
            ratio: if stats.ratio <= 0.0 && stats.uploaded > 0 && stats.downloaded == 0 {
                -1.0
            } else {
                stats.ratio
            },
            unread_message_count: index
                .notifications
                .map_or(0, |notifications| notifications.messages),
            last_update: chrono::Utc::now().timestamp(),
            ..UserInfo::default()
        })
    }
}
