//! Fan-out/fan-in search across a set of registered sites.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use trawler_site_core::{SearchQuery, Site, SiteResult, TorrentItem};

use crate::merge::dedup_items;
use crate::normalize::normalize_title;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result-set filters applied after normalization, before deduplication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Drop items with fewer seeders.
    #[serde(default)]
    pub min_seeders: u32,
    /// Drop items smaller than this; zero disables the bound.
    #[serde(default)]
    pub min_size_bytes: u64,
    /// Drop items larger than this; zero disables the bound.
    #[serde(default)]
    pub max_size_bytes: u64,
    /// Keep only structurally free torrents.
    #[serde(default)]
    pub free_only: bool,
}

impl SearchFilters {
    fn keep(&self, item: &TorrentItem) -> bool {
        if item.seeders < self.min_seeders {
            return false;
        }
        if self.min_size_bytes > 0 && item.size_bytes < self.min_size_bytes {
            return false;
        }
        if self.max_size_bytes > 0 && item.size_bytes > self.max_size_bytes {
            return false;
        }
        if self.free_only && !item.is_free() {
            return false;
        }
        true
    }
}

/// One multi-site search request.
#[derive(Debug, Clone, Default)]
pub struct MultiSiteSearchQuery {
    /// Base query sent to every selected site.
    pub query: SearchQuery,
    /// Site ids to search; empty means every registered site.
    pub sites: Vec<String>,
    /// Per-site time limit; a site exceeding it becomes an error entry.
    pub timeout: Option<Duration>,
    /// Result filters.
    pub filters: SearchFilters,
}

/// Per-site failure carried inside the result envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteFailure {
    /// Site that failed.
    pub site: String,
    /// Human-readable failure description.
    pub error: String,
}

/// Merged outcome of one multi-site search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiSiteSearchResult {
    /// Normalised, filtered, deduplicated, ranked items.
    pub items: Vec<TorrentItem>,
    /// Number of rows collected across sites before dedup and filtering.
    pub total_results: usize,
    /// Raw row count per site.
    pub site_results: HashMap<String, usize>,
    /// Per-site failures; successful sites are never hidden by these.
    pub errors: Vec<SiteFailure>,
    /// Wall-clock duration of the whole fan-out.
    pub duration: Duration,
}

impl MultiSiteSearchResult {
    /// Items whose discount level is structurally free.
    #[must_use]
    pub fn free_items(&self) -> Vec<&TorrentItem> {
        self.items.iter().filter(|item| item.is_free()).collect()
    }

    /// Items originating from one site.
    #[must_use]
    pub fn by_site(&self, site: &str) -> Vec<&TorrentItem> {
        self.items
            .iter()
            .filter(|item| item.source_site == site)
            .collect()
    }
}

/// Holds the registered sites and runs concurrent searches over them.
///
/// The orchestrator does not own site lifecycles; registration hands it a
/// shared handle.
#[derive(Default)]
pub struct SearchOrchestrator {
    sites: RwLock<HashMap<String, Arc<dyn Site>>>,
}

impl SearchOrchestrator {
    /// Empty orchestrator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    /// Run one concurrent search.
    ///
    /// All selected sites start before any result is joined; a site that
    /// fails or exceeds the timeout contributes an error entry while the
    /// rest proceed. Panicking site tasks are recovered into error entries.
    ///
    /// # Errors
    ///
    /// Only argument validation can fail; per-site failures ride inside
    /// the envelope.
    pub async fn search(&self, request: MultiSiteSearchQuery) -> SiteResult<MultiSiteSearchResult> {
        request.query.validate()?;
        let started = Instant::now();
        let timeout = request.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let mut errors: Vec<SiteFailure> = Vec::new();
        let selected: Vec<Arc<dyn Site>> = {
            let sites = self.sites.read().expect("site map poisoned");
            if request.sites.is_empty() {
                sites.values().cloned().collect()
            } else {
                let mut chosen = Vec::with_capacity(request.sites.len());
                for id in &request.sites {
                    match sites.get(id) {
                        Some(site) => chosen.push(Arc::clone(site)),
                        None => errors.push(SiteFailure {
                            site: id.clone(),
                            error: format!("site '{id}' not found"),
                        }),
                    }
                }
                chosen
            }
        };

        let mut join_set: JoinSet<(String, Result<SiteResult<Vec<TorrentItem>>, ()>)> =
            JoinSet::new();
        for site in selected {
            let query = request.query.clone();
            let id = site.id().to_string();
            join_set.spawn(async move {
                let outcome = tokio::time::timeout(timeout, site.search(&query))
                    .await
                    .map_err(|_| ());
                (id, outcome)
            });
        }

        let mut collected: Vec<TorrentItem> = Vec::new();
        let mut site_results: HashMap<String, usize> = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((site, Ok(Ok(items)))) => {
                    debug!(%site, count = items.len(), "site search finished");
                    site_results.insert(site, items.len());
                    collected.extend(items);
                }
                Ok((site, Ok(Err(error)))) => {
                    warn!(%site, %error, "site search failed");
                    errors.push(SiteFailure {
                        site,
                        error: error.to_string(),
                    });
                }
                Ok((site, Err(()))) => {
                    warn!(%site, ?timeout, "site search timed out");
                    errors.push(SiteFailure {
                        site,
                        error: format!("timed out after {timeout:?}"),
                    });
                }
                Err(join_error) => {
                    // A panicking site task must not take the query down.
                    warn!(%join_error, "site search task panicked");
                    errors.push(SiteFailure {
                        site: "<unknown>".to_string(),
                        error: format!("site task panicked: {join_error}"),
                    });
                }
            }
        }

        let total_results = collected.len();
        for item in &mut collected {
            item.title = normalize_title(&item.title);
        }
        collected.retain(|item| request.filters.keep(item));
        let mut items = dedup_items(collected);
        rank(&mut items);

        Ok(MultiSiteSearchResult {
            items,
            total_results,
            site_results,
            errors,
            duration: started.elapsed(),
        })
    }
}

/// Descending seeders; ties by snatched, then upload time, both descending.
fn rank(items: &mut [TorrentItem]) {
    items.sort_by(|a, b| {
        b.seeders
            .cmp(&a.seeders)
            .then_with(|| b.snatched.cmp(&a.snatched))
            .then_with(|| b.uploaded_at.cmp(&a.uploaded_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use trawler_site_core::{DiscountLevel, SiteDefinition, SiteError, SiteSchema, UserInfo};

    struct FakeSite {
        id: String,
        definition: Arc<SiteDefinition>,
        items: Vec<TorrentItem>,
        delay: Duration,
        fail: bool,
        panic: bool,
    }

    impl FakeSite {
        fn new(id: &str, items: Vec<TorrentItem>) -> Self {
            Self {
                id: id.to_string(),
                definition: Arc::new(SiteDefinition::new(
                    id,
                    id,
                    SiteSchema::Gazelle,
                    &["https://fake.example.org"],
                )),
                items,
                delay: Duration::ZERO,
                fail: false,
                panic: false,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn panicking(mut self) -> Self {
            self.panic = true;
            self
        }
    }

    #[async_trait]
    impl Site for FakeSite {
        fn id(&self) -> &str {
            &self.id
        }

        fn name(&self) -> &str {
            &self.id
        }

        fn definition(&self) -> &Arc<SiteDefinition> {
            &self.definition
        }

        async fn search(&self, _query: &SearchQuery) -> SiteResult<Vec<TorrentItem>> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            assert!(!self.panic, "intentional site panic");
            if self.fail {
                return Err(SiteError::TransientHttp {
                    site: self.id.clone(),
                    status: Some(503),
                    snippet: String::new(),
                });
            }
            let mut items = self.items.clone();
            for item in &mut items {
                item.source_site.clone_from(&self.id);
            }
            Ok(items)
        }

        async fn download_torrent(&self, _item: &TorrentItem) -> SiteResult<Vec<u8>> {
            Err(SiteError::Unsupported {
                operation: "download",
            })
        }

        async fn user_info(&self) -> SiteResult<UserInfo> {
            Err(SiteError::Unsupported {
                operation: "user_info",
            })
        }
    }

    fn item(title: &str, seeders: u32) -> TorrentItem {
        TorrentItem {
            id: title.to_string(),
            title: title.to_string(),
            seeders,
            ..TorrentItem::default()
        }
    }

    #[tokio::test]
    async fn slow_sites_become_error_entries() {
        let orchestrator = SearchOrchestrator::new();
        orchestrator.register_site(Arc::new(FakeSite::new("fast", vec![item("A", 1)])));
        orchestrator.register_site(Arc::new(
            FakeSite::new("slow", vec![item("B", 2)])
                .with_delay(Duration::from_millis(500)),
        ));

        let result = orchestrator
            .search(MultiSiteSearchQuery {
                query: SearchQuery::keyword("demo"),
                timeout: Some(Duration::from_millis(100)),
                ..MultiSiteSearchQuery::default()
            })
            .await
            .expect("search succeeds overall");

        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].source_site, "fast");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].site, "slow");
    }

    #[tokio::test]
    async fn failures_do_not_hide_successes() {
        let orchestrator = SearchOrchestrator::new();
        orchestrator.register_site(Arc::new(FakeSite::new("good", vec![item("A", 3)])));
        orchestrator.register_site(Arc::new(FakeSite::new("bad", vec![]).failing()));
        orchestrator.register_site(Arc::new(FakeSite::new("ugly", vec![]).panicking()));

        let result = orchestrator
            .search(MultiSiteSearchQuery::default())
            .await
            .expect("search succeeds overall");
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.site_results.get("good"), Some(&1));
    }

    #[tokio::test]
    async fn unknown_requested_sites_are_reported() {
        let orchestrator = SearchOrchestrator::new();
        orchestrator.register_site(Arc::new(FakeSite::new("known", vec![item("A", 1)])));
        let result = orchestrator
            .search(MultiSiteSearchQuery {
                sites: vec!["known".to_string(), "missing".to_string()],
                ..MultiSiteSearchQuery::default()
            })
            .await
            .expect("search succeeds overall");
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].error.contains("not found"));
    }

    #[tokio::test]
    async fn invalid_queries_fail_before_io() {
        let orchestrator = SearchOrchestrator::new();
        let error = orchestrator
            .search(MultiSiteSearchQuery {
                query: SearchQuery {
                    page: -1,
                    ..SearchQuery::default()
                },
                ..MultiSiteSearchQuery::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(error, SiteError::InvalidQuery { .. }));
    }

    #[tokio::test]
    async fn free_only_filters_by_structural_predicate() {
        let mut free = item("Free", 5);
        free.discount_level = DiscountLevel::Free;
        let mut twox = item("TwoXFree", 4);
        twox.discount_level = DiscountLevel::TwoXFree;
        let plain = item("Plain", 9);

        let orchestrator = SearchOrchestrator::new();
        orchestrator.register_site(Arc::new(FakeSite::new("one", vec![free, twox, plain])));
        let result = orchestrator
            .search(MultiSiteSearchQuery {
                filters: SearchFilters {
                    free_only: true,
                    ..SearchFilters::default()
                },
                ..MultiSiteSearchQuery::default()
            })
            .await
            .expect("search succeeds overall");
        assert_eq!(result.items.len(), 2);
        assert!(result.items.iter().all(TorrentItem::is_free));
        assert_eq!(result.total_results, 3, "pre-filter count");
    }

    #[tokio::test]
    async fn results_rank_by_seeders_with_documented_tiebreaks() {
        let mut a = item("A", 10);
        a.snatched = 5;
        a.uploaded_at = 100;
        let mut b = item("B", 10);
        b.snatched = 9;
        b.uploaded_at = 50;
        let c = item("C", 30);
        let mut d = item("D", 10);
        d.snatched = 9;
        d.uploaded_at = 80;

        let orchestrator = SearchOrchestrator::new();
        orchestrator.register_site(Arc::new(FakeSite::new("one", vec![a, b, c, d])));
        let result = orchestrator
            .search(MultiSiteSearchQuery::default())
            .await
            .expect("search succeeds overall");
        let titles: Vec<&str> = result.items.iter().map(|item| item.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "D", "B", "A"]);
        for pair in result.items.windows(2) {
            assert!(pair[0].seeders >= pair[1].seeders, "ranking law");
        }
    }

    #[tokio::test]
    async fn duplicate_hashes_merge_across_sites() {
        let mut a = item("[SiteA] Demo 1080P x264", 10);
        a.info_hash = "abc123".to_string();
        let mut b = item("Demo 1080p H.264", 20);
        b.info_hash = "abc123".to_string();

        let orchestrator = SearchOrchestrator::new();
        orchestrator.register_site(Arc::new(FakeSite::new("one", vec![a])));
        orchestrator.register_site(Arc::new(FakeSite::new("two", vec![b])));
        let result = orchestrator
            .search(MultiSiteSearchQuery::default())
            .await
            .expect("search succeeds overall");
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].seeders, 20);
        assert_eq!(result.items[0].title, "Demo 1080p H.264");
        assert_eq!(result.total_results, 2);
    }
}
