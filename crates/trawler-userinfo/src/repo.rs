//! Persistence contract for account snapshots, plus the in-memory
//! reference implementation used by tests and single-process deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use trawler_site_core::{AggregatedStats, SiteError, SiteResult, UserInfo};

/// Storage contract for the latest [`UserInfo`] per site.
///
/// A relational implementation lives outside the core; the service only
/// relies on this interface.
#[async_trait]
pub trait UserInfoRepo: Send + Sync {
    /// Insert or replace the snapshot for its site.
    async fn save(&self, info: &UserInfo) -> SiteResult<()>;

    /// Latest snapshot for `site`.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::SiteNotFound`] when no snapshot exists.
    async fn get(&self, site: &str) -> SiteResult<UserInfo>;

    /// Every stored snapshot.
    async fn list_all(&self) -> SiteResult<Vec<UserInfo>>;

    /// Snapshots for the named sites, skipping unknown ids.
    async fn list_by_sites(&self, sites: &[String]) -> SiteResult<Vec<UserInfo>>;

    /// Remove the snapshot for `site`, if any.
    async fn delete(&self, site: &str) -> SiteResult<()>;

    /// Fold every stored snapshot into aggregate totals.
    async fn get_aggregated(&self) -> SiteResult<AggregatedStats>;
}

/// Hash-map backed [`UserInfoRepo`].
#[derive(Default)]
pub struct InMemoryUserInfoRepo {
    rows: RwLock<HashMap<String, UserInfo>>,
}

impl InMemoryUserInfoRepo {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserInfoRepo for InMemoryUserInfoRepo {
    async fn save(&self, info: &UserInfo) -> SiteResult<()> {
        self.rows
            .write()
            .expect("user info rows poisoned")
            .insert(info.site.clone(), info.clone());
        Ok(())
    }

    async fn get(&self, site: &str) -> SiteResult<UserInfo> {
        self.rows
            .read()
            .expect("user info rows poisoned")
            .get(site)
            .cloned()
            .ok_or_else(|| SiteError::SiteNotFound {
                site: site.to_string(),
            })
    }

    async fn list_all(&self) -> SiteResult<Vec<UserInfo>> {
        Ok(self
            .rows
            .read()
            .expect("user info rows poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn list_by_sites(&self, sites: &[String]) -> SiteResult<Vec<UserInfo>> {
        let rows = self.rows.read().expect("user info rows poisoned");
        Ok(sites
            .iter()
            .filter_map(|site| rows.get(site).cloned())
            .collect())
    }

    async fn delete(&self, site: &str) -> SiteResult<()> {
        self.rows
            .write()
            .expect("user info rows poisoned")
            .remove(site);
        Ok(())
    }

    async fn get_aggregated(&self) -> SiteResult<AggregatedStats> {
        let rows = self.rows.read().expect("user info rows poisoned");
        Ok(AggregatedStats::aggregate(rows.values()))
    }
}
