//! Driver for Unit3D sites: the `/api/torrents` JSON API with bearer-token
//! authentication.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use trawler_site_core::{
    DiscountLevel, DriverContext, DriverRequest, DriverResponse, HttpExecutor, SearchQuery,
    SiteDefinition, SiteDriver, SiteError, SiteResult, TorrentItem, UserInfo,
};
use trawler_torrent::is_torrent_content_type;

use crate::de::{flexible_u32, flexible_u64};
use crate::pipeline::run_user_info_pipeline;

/// Unit3D schema driver.
pub struct Unit3dDriver {
    definition: Arc<SiteDefinition>,
    site_id: String,
    api_key: String,
    http: Arc<dyn HttpExecutor>,
}

/// Driver constructor registered for the `unit3d` schema.
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
    Ok(Arc::new(Unit3dDriver {
        site_id: config.id,
        api_key,
        definition,
        http,
    }))
}

#[derive(Deserialize)]
struct FilterResponse {
    #[serde(default)]
    data: Vec<FilterRow>,
}

#[derive(Deserialize)]
struct FilterRow {
    #[serde(deserialize_with = "flexible_u64", default)]
    id: u64,
    attributes: Attributes,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
struct Attributes {
    #[serde(default)]
    name: String,
    #[serde(deserialize_with = "flexible_u64", default)]
    size: u64,
    #[serde(deserialize_with = "flexible_u32", default)]
    seeders: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    leechers: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    times_completed: u32,
    #[serde(default)]
    freeleech: String,
    #[serde(default)]
    double_upload: bool,
    #[serde(default)]
    category: String,
    #[serde(default)]
    info_hash: String,
    #[serde(default)]
    details_link: String,
    #[serde(default)]
    download_link: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    internal: bool,
}

/// `freeleech` is the percentage taken *off* the download; what remains is
/// what counts against the quota.
fn map_discount(freeleech: &str, double_upload: bool) -> DiscountLevel {
    let discounted = freeleech.trim().trim_end_matches('%');
    match (discounted, double_upload) {
        ("100", true) => DiscountLevel::TwoXFree,
        ("100", false) => DiscountLevel::Free,
        ("50", true) => DiscountLevel::TwoX50,
        ("50", false) => DiscountLevel::Percent50,
        ("70", _) => DiscountLevel::Percent30,
        ("30", _) => DiscountLevel::Percent70,
        (_, true) => DiscountLevel::TwoXUp,
        _ => DiscountLevel::None,
    }
}

impl Unit3dDriver {
    fn with_auth(&self, request: DriverRequest) -> DriverRequest {
        request
            .with_header("Authorization", format!("Bearer {}", self.api_key))
            .with_header("Accept", "application/json")
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
impl SiteDriver for Unit3dDriver {
    fn definition(&self) -> &Arc<SiteDefinition> {
        &self.definition
    }

    fn prepare_search(&self, query: &SearchQuery) -> SiteResult<DriverRequest> {
        let mut request = DriverRequest::get("api/torrents/filter")
            .with_query("name", &query.keyword)
            .with_query("page", (query.page + 1).to_string());
        if query.page_size > 0 {
            request = request.with_query("perPage", query.page_size.to_string());
        }
        if query.free_only {
            request = request.with_query("free", "100");
        }
        if let Some(category) = &query.category {
            request = request.with_query("categories[]", category);
        }
        Ok(self.with_auth(request))
    }

    async fn execute(&self, request: DriverRequest) -> SiteResult<DriverResponse> {
        self.http.execute(&self.site_id, request).await
    }

    fn parse_search(&self, response: &DriverResponse) -> SiteResult<Vec<TorrentItem>> {
        let filter: FilterResponse =
            serde_json::from_slice(&response.body).map_err(|_| SiteError::Parse {
                site: self.site_id.clone(),
                what: "search listing",
                snippet: response.snippet(),
            })?;
        let items = filter
            .data
            .into_iter()
            .map(|row| {
                let attributes = row.attributes;
                let mut item = TorrentItem {
                    id: row.id.to_string(),
                    title: attributes.name,
                    size_bytes: attributes.size,
                    seeders: attributes.seeders,
                    leechers: attributes.leechers,
                    snatched: attributes.times_completed,
                    discount_level: map_discount(
                        &attributes.freeleech,
                        attributes.double_upload,
                    ),
                    category: attributes.category,
                    info_hash: attributes.info_hash.to_ascii_lowercase(),
                    url: attributes.details_link,
                    download_url: attributes.download_link,
                    uploaded_at: self.parse_site_time(&attributes.created_at),
                    ..TorrentItem::default()
                };
                if attributes.internal {
                    item.add_tag("internal");
                }
                item
            })
            .collect();
        Ok(items)
    }

    fn prepare_download(&self, item: &TorrentItem) -> SiteResult<DriverRequest> {
        if item.download_url.is_empty() {
            return Err(SiteError::Unsupported {
                operation: "prepare_download",
            });
        }
        Ok(self.with_auth(DriverRequest::get(&item.download_url)))
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

    /// Unit3D has no uniform account endpoint; sites that expose one
    /// declare it as a user-info pipeline in their definition.
    async fn get_user_info(&self) -> SiteResult<UserInfo> {
        if self.definition.user_info.is_none() {
            return Err(SiteError::Unsupported {
                operation: "get_user_info",
            });
        }
        let headers = vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            ),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        run_user_info_pipeline(&self.site_id, &self.definition, &self.http, &headers).await
    }
}
