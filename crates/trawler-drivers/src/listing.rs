//! Short-TTL cache of a driver's last full listing.
//!
//! Answers detail lookups (RSS enrichment) without extra requests. After
//! three consecutive misses the cache is considered stale and dropped so
//! the next listing refill recalibrates it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use trawler_site_core::{TorrentItem, TtlCache};

const LISTING_TTL: Duration = Duration::from_secs(5 * 60);
const LISTING_CAPACITY: usize = 2_048;
const MISS_THRESHOLD: u32 = 3;

/// Per-driver listing cache keyed by site-local torrent id.
pub(crate) struct ListingCache {
    entries: TtlCache<String, TorrentItem>,
    consecutive_misses: AtomicU32,
}

impl ListingCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: TtlCache::new(LISTING_CAPACITY, LISTING_TTL),
            consecutive_misses: AtomicU32::new(0),
        }
    }

    /// Store every row of a freshly parsed listing.
    pub(crate) fn fill(&self, items: &[TorrentItem]) {
        for item in items {
            if !item.id.is_empty() {
                self.entries.insert(item.id.clone(), item.clone());
            }
        }
        self.consecutive_misses.store(0, Ordering::Relaxed);
    }

    /// Look up one row; three consecutive misses invalidate the cache.
    pub(crate) fn find(&self, id: &str) -> Option<TorrentItem> {
        match self.entries.get(id) {
            Some(item) => {
                self.consecutive_misses.store(0, Ordering::Relaxed);
                Some(item)
            }
            None => {
                let misses = self.consecutive_misses.fetch_add(1, Ordering::Relaxed) + 1;
                if misses >= MISS_THRESHOLD {
                    self.entries.clear();
                    self.consecutive_misses.store(0, Ordering::Relaxed);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> TorrentItem {
        TorrentItem {
            id: id.to_string(),
            title: format!("release {id}"),
            ..TorrentItem::default()
        }
    }

    #[test]
    fn hits_reset_the_miss_counter() {
        let cache = ListingCache::new();
        cache.fill(&[item("1"), item("2")]);
        assert!(cache.find("missing").is_none());
        assert!(cache.find("1").is_some());
        assert!(cache.find("missing").is_none());
        assert!(cache.find("2").is_some(), "cache survives scattered misses");
    }

    #[test]
    fn three_consecutive_misses_invalidate() {
        let cache = ListingCache::new();
        cache.fill(&[item("1")]);
        for _ in 0..3 {
            assert!(cache.find("missing").is_none());
        }
        assert!(cache.find("1").is_none(), "cache dropped after recalibration");
    }
}
