//! Driver for the mTorrent (M-Team) JSON API: `x-api-key` authentication,
//! string-typed numeric fields, and a fan-out composite user-info fetch.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;
use trawler_site_core::{
    DiscountLevel, DriverContext, DriverRequest, DriverResponse, HttpExecutor, SearchQuery,
    SiteDefinition, SiteDriver, SiteError, SiteResult, TorrentItem, UserInfo,
};
use trawler_torrent::is_torrent_content_type;

use crate::de::{flexible_f64, flexible_u32, flexible_u64, optional_string};

const DEFAULT_PAGE_SIZE: i32 = 100;
const USER_INFO_CONCURRENCY: usize = 2;

/// mTorrent schema driver.
pub struct MTorrentDriver {
    definition: Arc<SiteDefinition>,
    site_id: String,
    api_key: String,
    http: Arc<dyn HttpExecutor>,
}

/// Driver constructor registered for the `mtorrent` schema.
///
/// # Errors
///
/// Returns [`SiteError::InvalidCredentials`] when the config carries no
/// API key.
pub(crate) fn create(context: DriverContext) -> SiteResult<Arc<dyn SiteDriver>> {
    let DriverContext {
        definition,
        config,
        http,
    } = context;
    let api_key = config.require_option("apiKey")?;
    Ok(Arc::new(MTorrentDriver {
        site_id: config.id,
        api_key,
        definition,
        http,
    }))
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn ok(&self) -> bool {
        match &self.code {
            serde_json::Value::String(code) => code == "0",
            serde_json::Value::Number(code) => code.as_i64() == Some(0),
            _ => false,
        }
    }
}

#[derive(Deserialize)]
struct SearchData {
    #[serde(default)]
    data: Vec<SearchRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRow {
    #[serde(deserialize_with = "flexible_u64", default)]
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(deserialize_with = "optional_string", default)]
    small_descr: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(deserialize_with = "flexible_u64", default)]
    size: u64,
    #[serde(default)]
    created_date: String,
    #[serde(default)]
    status: Option<RowStatus>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RowStatus {
    #[serde(deserialize_with = "flexible_u32", default)]
    seeders: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    leechers: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    times_completed: u32,
    #[serde(default)]
    discount: Option<String>,
    #[serde(deserialize_with = "optional_string", default)]
    discount_end_time: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    #[serde(deserialize_with = "flexible_u64", default)]
    id: u64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    created_date: String,
    #[serde(default)]
    member_count: Option<MemberCount>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberCount {
    #[serde(deserialize_with = "flexible_u64", default)]
    uploaded: u64,
    #[serde(deserialize_with = "flexible_u64", default)]
    downloaded: u64,
    #[serde(deserialize_with = "flexible_f64", default)]
    share_rate: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    bonus: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerStatus {
    #[serde(deserialize_with = "flexible_u32", default)]
    seeder: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    leecher: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyStatistic {
    #[serde(deserialize_with = "flexible_u32", default)]
    un_make: u32,
}

fn map_discount(token: Option<&str>) -> DiscountLevel {
    match token.unwrap_or_default() {
        "FREE" => DiscountLevel::Free,
        "_2X_FREE" => DiscountLevel::TwoXFree,
        "_2X" => DiscountLevel::TwoXUp,
        "_2X_PERCENT_50" => DiscountLevel::TwoX50,
        "PERCENT_30" => DiscountLevel::Percent30,
        "PERCENT_50" => DiscountLevel::Percent50,
        "PERCENT_70" => DiscountLevel::Percent70,
        _ => DiscountLevel::None,
    }
}

impl MTorrentDriver {
    fn auth_header(&self) -> (String, String) {
        ("x-api-key".to_string(), self.api_key.clone())
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
        if !envelope.ok() {
            return Err(SiteError::Parse {
                site: self.site_id.clone(),
                what,
                snippet: envelope.message.unwrap_or_else(|| response.snippet()),
            });
        }
        envelope.data.ok_or_else(|| SiteError::Parse {
            site: self.site_id.clone(),
            what,
            snippet: response.snippet(),
        })
    }

    fn parse_site_time(&self, raw: &str) -> i64 {
        trawler_extract::apply_filters(
            trawler_extract::Value::Str(raw.to_string()),
            &[trawler_site_core::FilterCall::new(
                "parseTime",
                &[&self.definition.timezone_offset],
            )],
        )
        .map(|value| value.to_i64())
        .unwrap_or_default()
    }
}

#[async_trait]
impl SiteDriver for MTorrentDriver {
    fn definition(&self) -> &Arc<SiteDefinition> {
        &self.definition
    }

    fn prepare_search(&self, query: &SearchQuery) -> SiteResult<DriverRequest> {
        let page_size = if query.page_size > 0 {
            query.page_size
        } else {
            DEFAULT_PAGE_SIZE
        };
        let mut body = serde_json::json!({
            "mode": "normal",
            "keyword": query.keyword,
            "pageNumber": query.page + 1,
            "pageSize": page_size,
        });
        if query.free_only {
            body["discount"] = serde_json::Value::String("FREE".to_string());
        }
        if let Some(category) = &query.category {
            body["categories"] = serde_json::json!([category]);
        }
        let (name, value) = self.auth_header();
        Ok(DriverRequest::post("api/torrent/search")
            .with_header(name, value)
            .with_json(body))
    }

    async fn execute(&self, request: DriverRequest) -> SiteResult<DriverResponse> {
        self.http.execute(&self.site_id, request).await
    }

    fn parse_search(&self, response: &DriverResponse) -> SiteResult<Vec<TorrentItem>> {
        let data: SearchData = self.decode(response, "search listing")?;
        let items = data
            .data
            .into_iter()
            .map(|row| {
                let status = row.status.unwrap_or(RowStatus {
                    seeders: 0,
                    leechers: 0,
                    times_completed: 0,
                    discount: None,
                    discount_end_time: None,
                });
                let mut item = TorrentItem {
                    id: row.id.to_string(),
                    title: row.name,
                    subtitle: row.small_descr,
                    size_bytes: row.size,
                    seeders: status.seeders,
                    leechers: status.leechers,
                    snatched: status.times_completed,
                    discount_level: map_discount(status.discount.as_deref()),
                    category: row.category.unwrap_or_default(),
                    url: format!("detail/{}", row.id),
                    uploaded_at: self.parse_site_time(&row.created_date),
                    ..TorrentItem::default()
                };
                if let Some(end) = status.discount_end_time.as_deref() {
                    let stamp = self.parse_site_time(end);
                    if stamp > 0 {
                        item.discount_end_time = Some(stamp);
                    }
                }
                for label in row.labels {
                    item.add_tag(label);
                }
                item
            })
            .collect();
        Ok(items)
    }

    fn prepare_download(&self, item: &TorrentItem) -> SiteResult<DriverRequest> {
        let (name, value) = self.auth_header();
        Ok(DriverRequest::post("api/torrent/genDlToken")
            .with_header(name, value)
            .with_form(vec![("id".to_string(), item.id.clone())]))
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

    /// Two-phase download: the API first mints a signed download URL.
    async fn download_torrent(&self, item: &TorrentItem) -> SiteResult<Vec<u8>> {
        let token_request = self.prepare_download(item)?;
        let token_response = self.execute(token_request).await?;
        let url: String = self.decode(&token_response, "download token")?;
        let (name, value) = self.auth_header();
        let response = self
            .execute(DriverRequest::get(url).with_header(name, value))
            .await?;
        self.parse_download(&response)
    }

    fn prepare_user_info(&self) -> SiteResult<DriverRequest> {
        let (name, value) = self.auth_header();
        Ok(DriverRequest::post("api/member/profile").with_header(name, value))
    }

    fn parse_user_info(&self, response: &DriverResponse) -> SiteResult<UserInfo> {
        let profile: Profile = self.decode(response, "user info")?;
        let counts = profile.member_count.unwrap_or(MemberCount {
            uploaded: 0,
            downloaded: 0,
            share_rate: 0.0,
            bonus: 0.0,
        });
        let ratio = if counts.share_rate > 0.0 {
            counts.share_rate
        } else if counts.downloaded == 0 && counts.uploaded > 0 {
            -1.0
        } else {
            0.0
        };
        Ok(UserInfo {
            site: self.site_id.clone(),
            user_id: profile.id.to_string(),
            username: profile.username,
            level_name: profile.role.unwrap_or_default(),
            uploaded: counts.uploaded,
            downloaded: counts.downloaded,
            ratio,
            bonus: counts.bonus,
            join_date: self.parse_site_time(&profile.created_date),
            last_update: chrono::Utc::now().timestamp(),
            ..UserInfo::default()
        })
    }

    /// Composite fetch: profile, peer status, and unread counters fan out
    /// concurrently under a small semaphore.
    async fn get_user_info(&self) -> SiteResult<UserInfo> {
        let semaphore = Arc::new(Semaphore::new(USER_INFO_CONCURRENCY));
        let mut join_set: JoinSet<(u8, SiteResult<DriverResponse>)> = JoinSet::new();
        for (kind, path) in [
            (0u8, "api/member/profile"),
            (1u8, "api/tracker/myPeerStatus"),
            (2u8, "api/msg/notify/statistic"),
        ] {
            let http = Arc::clone(&self.http);
            let site = self.site_id.clone();
            let (name, value) = self.auth_header();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let request = DriverRequest::post(path).with_header(name, value);
                (kind, http.execute(&site, request).await)
            });
        }

        let mut profile_response = None;
        let mut peers = None;
        let mut unread = None;
        while let Some(joined) = join_set.join_next().await {
            let Ok((kind, outcome)) = joined else {
                warn!(site = %self.site_id, "user-info subtask panicked");
                continue;
            };
            match (kind, outcome) {
                (0, Ok(response)) => profile_response = Some(response),
                (0, Err(err)) => return Err(err),
                (1, Ok(response)) => peers = Some(response),
                (2, Ok(response)) => unread = Some(response),
                // Optional sub-requests degrade gracefully.
                (_, Err(err)) => {
                    warn!(site = %self.site_id, %err, "optional user-info request failed");
                }
                _ => {}
            }
        }

        let profile_response = profile_response.ok_or(SiteError::Unsupported {
            operation: "get_user_info",
        })?;
        let mut info = self.parse_user_info(&profile_response)?;
        if let Some(response) = peers
            && let Ok(status) = self.decode::<PeerStatus>(&response, "peer status")
        {
            info.seeding = status.seeder;
            info.leeching = status.leecher;
        }
        if let Some(response) = unread
            && let Ok(statistic) = self.decode::<NotifyStatistic>(&response, "unread counter")
        {
            info.unread_message_count = statistic.un_make;
        }
        Ok(info)
    }
}
