//! Rate-limiting, identity-tagging wrapper around any driver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use trawler_http::RateLimiter;
use trawler_site_core::{
    SearchQuery, Site, SiteDefinition, SiteDriver, SiteError, SiteResult, TorrentItem, UserInfo,
};

/// Upper bound on a single token-bucket wait before the call is abandoned
/// with a *rate-limit* error.
const MAX_RATE_WAIT: Duration = Duration::from_secs(30);

/// Uniform wrapper turning a [`SiteDriver`] into a [`Site`].
///
/// Applies the per-site token bucket, wraps every driver failure with
/// `{site, operation}` context, and stamps `source_site` onto parsed items.
pub struct BaseSite {
    id: String,
    name: String,
    driver: Arc<dyn SiteDriver>,
    limiter: RateLimiter,
}

impl BaseSite {
    /// Wrap a driver.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        driver: Arc<dyn SiteDriver>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            driver,
            limiter,
        }
    }

    async fn throttle(&self, operation: &'static str) -> SiteResult<()> {
        if self.limiter.try_acquire() {
            return Ok(());
        }
        debug!(site = %self.id, operation, "waiting on rate limiter");
        tokio::time::timeout(MAX_RATE_WAIT, self.limiter.acquire())
            .await
            .map_err(|_| {
                warn!(site = %self.id, operation, "rate limiter wait abandoned");
                SiteError::RateLimited {
                    site: self.id.clone(),
                }
            })
    }
}

#[async_trait]
impl Site for BaseSite {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> &Arc<SiteDefinition> {
        self.driver.definition()
    }

    async fn search(&self, query: &SearchQuery) -> SiteResult<Vec<TorrentItem>> {
        query.validate()?;
        self.throttle("search").await?;
        let outcome: SiteResult<Vec<TorrentItem>> = async {
            let request = self.driver.prepare_search(query)?;
            let response = self.driver.execute(request).await?;
            self.driver.parse_search(&response)
        }
        .await;
        let mut items = outcome.map_err(|err| err.with_context(&self.id, "search"))?;
        for item in &mut items {
            item.source_site.clone_from(&self.id);
        }
        info!(site = %self.id, results = items.len(), "search completed");
        Ok(items)
    }

    async fn download_torrent(&self, item: &TorrentItem) -> SiteResult<Vec<u8>> {
        self.throttle("download").await?;
        let bytes = self
            .driver
            .download_torrent(item)
            .await
            .map_err(|err| err.with_context(&self.id, "download"))?;
        info!(site = %self.id, torrent = %item.id, bytes = bytes.len(), "torrent fetched");
        Ok(bytes)
    }

    async fn user_info(&self) -> SiteResult<UserInfo> {
        self.throttle("user_info").await?;
        let mut info = self
            .driver
            .get_user_info()
            .await
            .map_err(|err| err.with_context(&self.id, "user_info"))?;
        if info.site.is_empty() {
            info.site.clone_from(&self.id);
        }
        debug!(site = %self.id, user = %info.username, "user info fetched");
        Ok(info)
    }
}
