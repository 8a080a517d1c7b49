//! Account snapshot service over the registered sites.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use trawler_site_core::{
    AggregatedStats, Site, SiteError, SiteResult, TtlCache, UserInfo,
};

use crate::repo::UserInfoRepo;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const CACHE_CAPACITY: usize = 256;

/// Per-site failure from a bulk sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFailure {
    /// Site that failed.
    pub site: String,
    /// Human-readable failure description.
    pub error: String,
}

/// Outcome of one bulk sync; never a top-level error.
#[derive(Debug, Default)]
pub struct UserInfoSyncResult {
    /// Snapshots fetched and saved.
    pub succeeded: Vec<UserInfo>,
    /// Per-site failures.
    pub errors: Vec<SyncFailure>,
}

/// Fetches, caches, and persists per-site account snapshots.
pub struct UserInfoService {
    sites: RwLock<HashMap<String, Arc<dyn Site>>>,
    cache: TtlCache<String, UserInfo>,
    repo: Arc<dyn UserInfoRepo>,
}

impl UserInfoService {
    /// Service over `repo` with the default five-minute cache.
    #[must_use]
    pub fn new(repo: Arc<dyn UserInfoRepo>) -> Self {
        Self::with_cache_ttl(repo, DEFAULT_CACHE_TTL)
    }

    /// Service with a custom cache time-to-live.
    #[must_use]
    pub fn with_cache_ttl(repo: Arc<dyn UserInfoRepo>, ttl: Duration) -> Self {
        Self {
            sites: RwLock::new(HashMap::new()),
            cache: TtlCache::new(CACHE_CAPACITY, ttl),
            repo,
        }
    }

    /// Register a site under its id; replaces any previous entry.
    pub fn register_site(&self, site: Arc<dyn Site>) {
        self.sites
            .write()
            .expect("site map poisoned")
            .insert(site.id().to_string(), site);
    }

    /// Remove a site by id.
    pub fn remove_site(&self, id: &str) {
        self.sites.write().expect("site map poisoned").remove(id);
        self.cache.remove(id);
    }

    /// Ids of every registered site.
    #[must_use]
    pub fn site_ids(&self) -> Vec<String> {
        self.sites
            .read()
            .expect("site map poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Fetch one site's snapshot, apply pick-last carry-over, and persist.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::SiteNotFound`] for unregistered ids and any
    /// driver-level failure from the fetch.
    pub async fn fetch_user_info(&self, site_id: &str) -> SiteResult<UserInfo> {
        let site = self
            .sites
            .read()
            .expect("site map poisoned")
            .get(site_id)
            .cloned()
            .ok_or_else(|| SiteError::SiteNotFound {
                site: site_id.to_string(),
            })?;
        let fresh = site.user_info().await?;
        self.finalize_snapshot(&site, fresh).await
    }

    /// Apply pick-last carry-over against the previous snapshot, then write
    /// through the cache into the repository.
    async fn finalize_snapshot(
        &self,
        site: &Arc<dyn Site>,
        mut fresh: UserInfo,
    ) -> SiteResult<UserInfo> {
        let site_id = site.id().to_string();
        if fresh.site.is_empty() {
            fresh.site.clone_from(&site_id);
        }

        let previous = match self.cache.get(&site_id) {
            Some(cached) => Some(cached),
            None => self.repo.get(&site_id).await.ok(),
        };
        if let Some(previous) = previous {
            let pick_last = site
                .definition()
                .user_info
                .as_ref()
                .map(|config| config.pick_last.clone())
                .unwrap_or_default();
            apply_pick_last(&pick_last, &mut fresh, &previous);
        }

        self.cache.insert(site_id.clone(), fresh.clone());
        self.repo.save(&fresh).await?;
        debug!(site = %site_id, user = %fresh.username, "user info saved");
        Ok(fresh)
    }

    /// Cached snapshot for `site`, falling back to the repository.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::SiteNotFound`] when neither layer has one.
    pub async fn get_user_info(&self, site: &str) -> SiteResult<UserInfo> {
        if let Some(cached) = self.cache.get(site) {
            return Ok(cached);
        }
        let stored = self.repo.get(site).await?;
        self.cache.insert(site.to_string(), stored.clone());
        Ok(stored)
    }

    /// Sync every registered site with bounded concurrency.
    ///
    /// One task per site, capped by a semaphore of `max_concurrent`
    /// permits; each task gets its own `timeout`. Failures become entries
    /// in the result, never a top-level error.
    pub async fn fetch_and_save_all(
        &self,
        max_concurrent: usize,
        timeout: Duration,
    ) -> UserInfoSyncResult {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let selected: Vec<Arc<dyn Site>> = self
            .sites
            .read()
            .expect("site map poisoned")
            .values()
            .cloned()
            .collect();
        let mut join_set: JoinSet<(Arc<dyn Site>, Result<SiteResult<UserInfo>, ()>)> =
            JoinSet::new();
        for site in selected {
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = tokio::time::timeout(timeout, site.user_info())
                    .await
                    .map_err(|_| ());
                (site, outcome)
            });
        }

        let mut result = UserInfoSyncResult::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((site, Ok(Ok(fresh)))) => {
                    match self.finalize_snapshot(&site, fresh).await {
                        Ok(info) => result.succeeded.push(info),
                        Err(error) => result.errors.push(SyncFailure {
                            site: site.id().to_string(),
                            error: error.to_string(),
                        }),
                    }
                }
                Ok((site, Ok(Err(error)))) => {
                    warn!(site = %site.id(), %error, "user info sync failed");
                    result.errors.push(SyncFailure {
                        site: site.id().to_string(),
                        error: error.to_string(),
                    });
                }
                Ok((site, Err(()))) => {
                    warn!(site = %site.id(), ?timeout, "user info sync timed out");
                    result.errors.push(SyncFailure {
                        site: site.id().to_string(),
                        error: format!("timed out after {timeout:?}"),
                    });
                }
                Err(join_error) => {
                    warn!(%join_error, "user info task panicked");
                    result.errors.push(SyncFailure {
                        site: "<unknown>".to_string(),
                        error: format!("sync task panicked: {join_error}"),
                    });
                }
            }
        }
        result
    }

    /// Aggregate totals across every persisted snapshot.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub async fn aggregated(&self) -> SiteResult<AggregatedStats> {
        self.repo.get_aggregated().await
    }
}

/// Carry over the previous snapshot's value for fields whose fresh fetch
/// came back zero or empty.
fn apply_pick_last(fields: &[String], fresh: &mut UserInfo, previous: &UserInfo) {
    for field in fields {
        match field.as_str() {
            "uploaded" if fresh.uploaded == 0 => fresh.uploaded = previous.uploaded,
            "downloaded" if fresh.downloaded == 0 => fresh.downloaded = previous.downloaded,
            "ratio" if fresh.ratio.abs() < f64::EPSILON => fresh.ratio = previous.ratio,
            "bonus" if fresh.bonus.abs() < f64::EPSILON => fresh.bonus = previous.bonus,
            "bonus_per_hour" if fresh.bonus_per_hour.abs() < f64::EPSILON => {
                fresh.bonus_per_hour = previous.bonus_per_hour;
            }
            "seeding" if fresh.seeding == 0 => fresh.seeding = previous.seeding,
            "seeding_size" if fresh.seeding_size == 0 => {
                fresh.seeding_size = previous.seeding_size;
            }
            "username" if fresh.username.is_empty() => {
                fresh.username.clone_from(&previous.username);
            }
            "level_name" if fresh.level_name.is_empty() => {
                fresh.level_name.clone_from(&previous.level_name);
            }
            "join_date" if fresh.join_date == 0 => fresh.join_date = previous.join_date,
            _ => {}
        }
    }
}
