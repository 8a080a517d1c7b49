//! Driver for HDDolby: a NexusPHP derivative with a JSON API that
//! authenticates with an API key *and* the session cookie.
//!
//! Promotions arrive twice: as an integer `promotion_time_type` and as a
//! tag string (`gf` = 2xFree, `f` = Free, `g` = 2xUp). Tags win when both
//! are present.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use trawler_site_core::{
    DiscountLevel, DriverContext, DriverRequest, DriverResponse, HttpExecutor, SearchQuery,
    SiteDefinition, SiteDriver, SiteError, SiteResult, TorrentItem, UserInfo,
};
use trawler_torrent::is_torrent_content_type;

use crate::de::{flexible_f64, flexible_u32, flexible_u64, optional_string};
use crate::pipeline::run_user_info_pipeline;

/// HDDolby schema driver.
pub struct HdDolbyDriver {
    definition: Arc<SiteDefinition>,
    site_id: String,
    api_key: String,
    cookie: String,
    http: Arc<dyn HttpExecutor>,
}

/// Driver constructor registered for the `hddolby` schema.
///
/// # Errors
///
/// Returns [`SiteError::InvalidCredentials`] when the config is missing
/// the API key or the cookie.
pub(crate) fn create(context: DriverContext) -> SiteResult<Arc<dyn SiteDriver>> {
    let DriverContext {
        definition,
        config,
        http,
    } = context;
    let api_key = config.require_option("apiKey")?;
    let cookie = config.require_option("cookie")?;
    Ok(Arc::new(HdDolbyDriver {
        site_id: config.id,
        api_key,
        cookie,
        definition,
        http,
    }))
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(deserialize_with = "flexible_u32", default)]
    code: u32,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct TorrentsData {
    #[serde(default)]
    torrents: Vec<Row>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
struct Row {
    #[serde(deserialize_with = "flexible_u64", default)]
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(deserialize_with = "optional_string", default)]
    small_descr: Option<String>,
    #[serde(deserialize_with = "flexible_u64", default)]
    size: u64,
    #[serde(deserialize_with = "flexible_u32", default)]
    seeders: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    leechers: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    times_completed: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    promotion_time_type: u32,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    added: String,
    #[serde(deserialize_with = "flexible_u32", default)]
    hit_and_run: u32,
    #[serde(default)]
    info_hash: String,
    #[serde(default)]
    category: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
struct UserData {
    #[serde(deserialize_with = "flexible_u64", default)]
    id: u64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    class_name: String,
    #[serde(deserialize_with = "flexible_u64", default)]
    uploaded: u64,
    #[serde(deserialize_with = "flexible_u64", default)]
    downloaded: u64,
    #[serde(deserialize_with = "flexible_f64", default)]
    ratio: f64,
    #[serde(deserialize_with = "flexible_f64", default)]
    bonus: f64,
    #[serde(deserialize_with = "flexible_u32", default)]
    seeding: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    leeching: u32,
}

const fn promotion_level(promotion: u32) -> DiscountLevel {
    match promotion {
        2 => DiscountLevel::Free,
        3 => DiscountLevel::TwoXUp,
        4 => DiscountLevel::TwoXFree,
        5 => DiscountLevel::Percent50,
        6 => DiscountLevel::TwoX50,
        7 => DiscountLevel::Percent30,
        _ => DiscountLevel::None,
    }
}

fn tag_level(tags: &str) -> Option<DiscountLevel> {
    tags.split(',').map(str::trim).find_map(|tag| match tag {
        "gf" => Some(DiscountLevel::TwoXFree),
        "f" => Some(DiscountLevel::Free),
        "g" => Some(DiscountLevel::TwoXUp),
        _ => None,
    })
}

impl HdDolbyDriver {
    fn with_auth(&self, request: DriverRequest) -> DriverRequest {
        request
            .with_header("x-api-key", self.api_key.clone())
            .with_header("Cookie", self.cookie.clone())
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
        if envelope.code != 0 {
            return Err(SiteError::Parse {
                site: self.site_id.clone(),
                what,
                snippet: envelope.msg.unwrap_or_else(|| response.snippet()),
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
impl SiteDriver for HdDolbyDriver {
    fn definition(&self) -> &Arc<SiteDefinition> {
        &self.definition
    }

    fn prepare_search(&self, query: &SearchQuery) -> SiteResult<DriverRequest> {
        let mut request = DriverRequest::get("api/v1/torrents")
            .with_query("search", &query.keyword)
            .with_query("page", query.page.to_string());
        if query.page_size > 0 {
            request = request.with_query("page_size", query.page_size.to_string());
        }
        if query.free_only {
            request = request.with_query("promotion", "free");
        }
        Ok(self.with_auth(request))
    }

    async fn execute(&self, request: DriverRequest) -> SiteResult<DriverResponse> {
        self.http.execute(&self.site_id, request).await
    }

    fn parse_search(&self, response: &DriverResponse) -> SiteResult<Vec<TorrentItem>> {
        let data: TorrentsData = self.decode(response, "search listing")?;
        let items = data
            .torrents
            .into_iter()
            .map(|row| {
                // Tags carry the authoritative promotion when present.
                let discount_level =
                    tag_level(&row.tags).unwrap_or_else(|| promotion_level(row.promotion_time_type));
                let mut item = TorrentItem {
                    id: row.id.to_string(),
                    title: row.name,
                    subtitle: row.small_descr,
                    size_bytes: row.size,
                    seeders: row.seeders,
                    leechers: row.leechers,
                    snatched: row.times_completed,
                    discount_level,
                    category: row.category,
                    info_hash: row.info_hash.to_ascii_lowercase(),
                    url: format!("details.php?id={}", row.id),
                    download_url: format!("download.php?id={}", row.id),
                    uploaded_at: self.parse_site_time(&row.added),
                    has_hr: row.hit_and_run > 0,
                    ..TorrentItem::default()
                };
                for tag in row.tags.split(',') {
                    item.add_tag(tag.trim().to_string());
                }
                item
            })
            .collect();
        Ok(items)
    }

    fn prepare_download(&self, item: &TorrentItem) -> SiteResult<DriverRequest> {
        let request = if item.download_url.is_empty() {
            DriverRequest::get("download.php").with_query("id", &item.id)
        } else {
            DriverRequest::get(&item.download_url)
        };
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
        Ok(self.with_auth(DriverRequest::get("api/v1/user")))
    }

    fn parse_user_info(&self, response: &DriverResponse) -> SiteResult<UserInfo> {
        let data: UserData = self.decode(response, "user info")?;
        Ok(UserInfo {
            site: self.site_id.clone(),
            user_id: data.id.to_string(),
            username: data.username,
            level_name: data.class_name,
            uploaded: data.uploaded,
            downloaded: data.downloaded,
            ratio: if data.ratio <= 0.0 && data.uploaded > 0 && data.downloaded == 0 {
                -1.0
            } else {
                data.ratio
            },
            bonus: data.bonus,
            seeding: data.seeding,
            leeching: data.leeching,
            last_update: chrono::Utc::now().timestamp(),
            ..UserInfo::default()
        })
    }

    async fn get_user_info(&self) -> SiteResult<UserInfo> {
        // A declared pipeline overrides the stock endpoint, matching the
        // NexusPHP heritage of the HTML side of the site.
        if self.definition.user_info.is_some() {
            let headers = vec![
                ("x-api-key".to_string(), self.api_key.clone()),
                ("Cookie".to_string(), self.cookie.clone()),
            ];
            return run_user_info_pipeline(&self.site_id, &self.definition, &self.http, &headers)
                .await;
        }
        let request = self.prepare_user_info()?;
        let response = self.execute(request).await?;
        self.parse_user_info(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_win_over_promotion_type() {
        assert_eq!(tag_level("gf"), Some(DiscountLevel::TwoXFree));
        assert_eq!(tag_level("hdr, f"), Some(DiscountLevel::Free));
        assert_eq!(tag_level("g,zhongzi"), Some(DiscountLevel::TwoXUp));
        assert_eq!(tag_level("hdr,dv"), None);
        // When both disagree, the tag is authoritative.
        let from_tag = tag_level("f").unwrap_or_else(|| promotion_level(3));
        assert_eq!(from_tag, DiscountLevel::Free);
        // Without tags the promotion type decides.
        assert_eq!(promotion_level(4), DiscountLevel::TwoXFree);
        assert_eq!(promotion_level(99), DiscountLevel::None);
    }
}
