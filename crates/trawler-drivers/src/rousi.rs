//! Driver for the Rousi JSON API variant: a compact listing endpoint with
//! `x-api-key` authentication and boolean promotion flags.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use trawler_site_core::{
    DiscountLevel, DriverContext, DriverRequest, DriverResponse, HttpExecutor, SearchQuery,
    SiteDefinition, SiteDriver, SiteError, SiteResult, TorrentItem, UserInfo,
};
use trawler_torrent::is_torrent_content_type;

use crate::de::{flexible_f64, flexible_u32, flexible_u64};

/// Rousi schema driver.
pub struct RousiDriver {
    definition: Arc<SiteDefinition>,
    site_id: String,
    api_key: String,
    http: Arc<dyn HttpExecutor>,
}

/// Driver constructor registered for the `rousi` schema.
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
    Ok(Arc::new(RousiDriver {
        site_id: config.id,
        api_key,
        definition,
        http,
    }))
}

#[derive(Deserialize)]
struct Listing {
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
    #[serde(deserialize_with = "flexible_u64", default)]
    size: u64,
    #[serde(deserialize_with = "flexible_u32", default)]
    seeders: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    leechers: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    snatched: u32,
    #[serde(default)]
    free: bool,
    #[serde(default)]
    double_up: bool,
    #[serde(deserialize_with = "flexible_u64", default)]
    uploaded_at: u64,
    #[serde(default)]
    info_hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
struct Account {
    #[serde(deserialize_with = "flexible_u64", default)]
    id: u64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    class: String,
    #[serde(deserialize_with = "flexible_u64", default)]
    uploaded: u64,
    #[serde(deserialize_with = "flexible_u64", default)]
    downloaded: u64,
    #[serde(deserialize_with = "flexible_f64", default)]
    bonus: f64,
    #[serde(deserialize_with = "flexible_u32", default)]
    seeding: u32,
    #[serde(deserialize_with = "flexible_u32", default)]
    leeching: u32,
}

const fn flag_level(free: bool, double_up: bool) -> DiscountLevel {
    match (free, double_up) {
        (true, true) => DiscountLevel::TwoXFree,
        (true, false) => DiscountLevel::Free,
        (false, true) => DiscountLevel::TwoXUp,
        (false, false) => DiscountLevel::None,
    }
}

impl RousiDriver {
    fn with_auth(&self, request: DriverRequest) -> DriverRequest {
        request.with_header("x-api-key", self.api_key.clone())
    }

    fn decode<T: for<'de> Deserialize<'de>>(
        &self,
        response: &DriverResponse,
        what: &'static str,
    ) -> SiteResult<T> {
        serde_json::from_slice(&response.body).map_err(|_| SiteError::Parse {
            site: self.site_id.clone(),
            what,
            snippet: response.snippet(),
        })
    }
}

#[async_trait]
impl SiteDriver for RousiDriver {
    fn definition(&self) -> &Arc<SiteDefinition> {
        &self.definition
    }

    fn prepare_search(&self, query: &SearchQuery) -> SiteResult<DriverRequest> {
        let mut request = DriverRequest::get("api/torrents")
            .with_query("search", &query.keyword)
            .with_query("page", query.page.to_string());
        if query.free_only {
            request = request.with_query("free", "1");
        }
        Ok(self.with_auth(request))
    }

    async fn execute(&self, request: DriverRequest) -> SiteResult<DriverResponse> {
        self.http.execute(&self.site_id, request).await
    }

    fn parse_search(&self, response: &DriverResponse) -> SiteResult<Vec<TorrentItem>> {
        let listing: Listing = self.decode(response, "search listing")?;
        Ok(listing
            .torrents
            .into_iter()
            .map(|row| TorrentItem {
                id: row.id.to_string(),
                title: row.name,
                size_bytes: row.size,
                seeders: row.seeders,
                leechers: row.leechers,
                snatched: row.snatched,
                discount_level: flag_level(row.free, row.double_up),
                info_hash: row.info_hash.to_ascii_lowercase(),
                url: format!("torrents/{}", row.id),
                download_url: format!("api/torrents/{}/download", row.id),
                uploaded_at: i64::try_from(row.uploaded_at).unwrap_or_default(),
                ..TorrentItem::default()
            })
            .collect())
    }

    fn prepare_download(&self, item: &TorrentItem) -> SiteResult<DriverRequest> {
        let request = if item.download_url.is_empty() {
            DriverRequest::get(format!("api/torrents/{}/download", item.id))
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
        Ok(self.with_auth(DriverRequest::get("api/user")))
    }

    fn parse_user_info(&self, response: &DriverResponse) -> SiteResult<UserInfo> {
        let account: Account = self.decode(response, "user info")?;
        let ratio = if account.downloaded == 0 && account.uploaded > 0 {
            -1.0
        } else if account.downloaded > 0 {
            #[allow(clippy::cast_precision_loss)]
            let computed = account.uploaded as f64 / account.downloaded as f64;
            computed
        } else {
            0.0
        };
        Ok(UserInfo {
            site: self.site_id.clone(),
            user_id: account.id.to_string(),
            username: account.username,
            level_name: account.class,
            uploaded: account.uploaded,
            downloaded: account.downloaded,
            ratio,
            bonus: account.bonus,
            seeding: account.seeding,
            leeching: account.leeching,
            last_update: chrono::Utc::now().timestamp(),
            ..UserInfo::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_flags_combine() {
        assert_eq!(flag_level(true, true), DiscountLevel::TwoXFree);
        assert_eq!(flag_level(true, false), DiscountLevel::Free);
        assert_eq!(flag_level(false, true), DiscountLevel::TwoXUp);
        assert_eq!(flag_level(false, false), DiscountLevel::None);
    }
}
