//! Info-hash deduplication with field-wise merging.

use std::collections::HashMap;

use trawler_site_core::TorrentItem;

/// Merge duplicate listings keyed by info-hash.
///
/// Items without an info-hash pass through unchanged. When two items share
/// a hash the survivor takes the maximum of the seeders/leechers/snatched
/// counters and the upload time, the better discount level (carrying its
/// end time), the first-seen union of tags, and the first non-empty
/// download URL and magnet. The operation is idempotent.
#[must_use]
pub fn dedup_items(items: Vec<TorrentItem>) -> Vec<TorrentItem> {
    let mut merged: Vec<TorrentItem> = Vec::with_capacity(items.len());
    let mut by_hash: HashMap<String, usize> = HashMap::new();
    for item in items {
        if item.info_hash.is_empty() {
            merged.push(item);
            continue;
        }
        match by_hash.get(&item.info_hash) {
            Some(&index) => merge_into(&mut merged[index], item),
            None => {
                by_hash.insert(item.info_hash.clone(), merged.len());
                merged.push(item);
            }
        }
    }
    merged
}

fn merge_into(kept: &mut TorrentItem, other: TorrentItem) {
    kept.seeders = kept.seeders.max(other.seeders);
    kept.leechers = kept.leechers.max(other.leechers);
    kept.snatched = kept.snatched.max(other.snatched);
    kept.uploaded_at = kept.uploaded_at.max(other.uploaded_at);
    if other.discount_level.rank() > kept.discount_level.rank() {
        kept.discount_level = other.discount_level;
        kept.discount_end_time = other.discount_end_time;
    }
    for tag in other.tags {
        kept.add_tag(tag);
    }
    if kept.download_url.is_empty() {
        kept.download_url = other.download_url;
    }
    if kept.magnet.is_empty() {
        kept.magnet = other.magnet;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawler_site_core::DiscountLevel;

    fn item(hash: &str, seeders: u32) -> TorrentItem {
        TorrentItem {
            id: format!("t{seeders}"),
            title: "Demo".to_string(),
            info_hash: hash.to_string(),
            seeders,
            ..TorrentItem::default()
        }
    }

    #[test]
    fn duplicate_hashes_keep_the_best_counters() {
        let merged = dedup_items(vec![item("abc123", 10), item("abc123", 20)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].seeders, 20);
    }

    #[test]
    fn hashless_items_pass_through() {
        let merged = dedup_items(vec![item("", 1), item("", 2), item("abc", 3)]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn better_discount_wins_and_carries_its_window() {
        let mut a = item("abc", 5);
        a.discount_level = DiscountLevel::Percent50;
        a.discount_end_time = Some(100);
        let mut b = item("abc", 3);
        b.discount_level = DiscountLevel::TwoXFree;
        b.discount_end_time = Some(200);
        let merged = dedup_items(vec![a, b]);
        assert_eq!(merged[0].discount_level, DiscountLevel::TwoXFree);
        assert_eq!(merged[0].discount_end_time, Some(200));
    }

    #[test]
    fn tags_union_preserves_first_seen_order() {
        let mut a = item("abc", 5);
        a.tags = vec!["official".to_string(), "hdr".to_string()];
        let mut b = item("abc", 3);
        b.tags = vec!["hdr".to_string(), "dv".to_string()];
        let merged = dedup_items(vec![a, b]);
        assert_eq!(
            merged[0].tags,
            vec!["official".to_string(), "hdr".to_string(), "dv".to_string()]
        );
    }

    #[test]
    fn first_non_empty_links_survive() {
        let mut a = item("abc", 5);
        a.magnet = String::new();
        a.download_url = "download.php?id=1".to_string();
        let mut b = item("abc", 3);
        b.magnet = "magnet:?xt=urn:btih:abc".to_string();
        b.download_url = "other.php?id=2".to_string();
        let merged = dedup_items(vec![a, b]);
        assert_eq!(merged[0].download_url, "download.php?id=1");
        assert_eq!(merged[0].magnet, "magnet:?xt=urn:btih:abc");
    }

    #[test]
    fn dedup_is_idempotent() {
        let mut a = item("abc", 5);
        a.discount_level = DiscountLevel::Free;
        let b = item("abc", 9);
        let c = item("def", 1);
        let once = dedup_items(vec![a, b, c]);
        let twice = dedup_items(once.clone());
        assert_eq!(once.len(), twice.len());
        for (left, right) in once.iter().zip(twice.iter()) {
            assert_eq!(left.seeders, right.seeders);
            assert_eq!(left.discount_level, right.discount_level);
            assert_eq!(left.tags, right.tags);
        }
    }
}
