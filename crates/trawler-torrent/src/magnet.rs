//! Magnet URI parsing and construction.

use url::Url;

use crate::error::{TorrentParseError, TorrentParseResult};

const BTIH_PREFIX: &str = "urn:btih:";
const MAGNET_LOG_LIMIT: usize = 120;

/// Extract the info-hash from a magnet URI's `xt=urn:btih:` parameter.
///
/// Accepts the 40-character hex form and the 32-character base32 form;
/// the result is always 40-character lowercase hex.
///
/// # Errors
///
/// Returns [`TorrentParseError::InvalidMagnet`] when the URI does not
/// parse, carries no `btih` parameter, or the hash has an unknown shape.
pub fn magnet_info_hash(uri: &str) -> TorrentParseResult<String> {
    let invalid = || TorrentParseError::InvalidMagnet {
        uri: truncate(uri),
    };
    let parsed = Url::parse(uri).map_err(|_| invalid())?;
    if parsed.scheme() != "magnet" {
        return Err(invalid());
    }
    let topic = parsed
        .query_pairs()
        .find_map(|(key, value)| {
            (key == "xt" && value.starts_with(BTIH_PREFIX))
                .then(|| value[BTIH_PREFIX.len()..].to_string())
        })
        .ok_or_else(invalid)?;

    match topic.len() {
        40 if topic.chars().all(|c| c.is_ascii_hexdigit()) => Ok(topic.to_ascii_lowercase()),
        32 => {
            let decoded = base32::decode(
                base32::Alphabet::Rfc4648 { padding: false },
                &topic.to_ascii_uppercase(),
            )
            .filter(|bytes| bytes.len() == 20)
            .ok_or_else(invalid)?;
            Ok(hex::encode(decoded))
        }
        _ => Err(invalid()),
    }
}

/// Build a magnet URI from an info-hash, display name, and tracker list.
///
/// The display name and tracker URLs are percent-encoded; empty trackers
/// are skipped.
#[must_use]
pub fn build_magnet(info_hash: &str, name: &str, trackers: &[&str]) -> String {
    let mut uri = format!("magnet:?xt={BTIH_PREFIX}{}", info_hash.to_ascii_lowercase());
    if !name.is_empty() {
        uri.push_str("&dn=");
        uri.push_str(&urlencoding::encode(name));
    }
    for tracker in trackers {
        if tracker.is_empty() {
            continue;
        }
        uri.push_str("&tr=");
        uri.push_str(&urlencoding::encode(tracker));
    }
    uri
}

fn truncate(uri: &str) -> String {
    let mut end = uri.len().min(MAGNET_LOG_LIMIT);
    while end > 0 && !uri.is_char_boundary(end) {
        end -= 1;
    }
    uri[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_hashes_are_lowercased() {
        let hash = magnet_info_hash(
            "magnet:?xt=urn:btih:0123456789ABCDEF0123456789ABCDEF01234567&dn=x",
        )
        .expect("hex magnet");
        assert_eq!(hash, "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn base32_hashes_decode_to_hex() {
        let bytes: [u8; 20] = [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB,
            0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67,
        ];
        let encoded = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &bytes);
        assert_eq!(encoded.len(), 32);
        let uri = format!("magnet:?xt=urn:btih:{encoded}");
        let hash = magnet_info_hash(&uri).expect("base32 magnet");
        assert_eq!(hash, hex::encode(bytes));
    }

    #[test]
    fn malformed_magnets_are_rejected() {
        for uri in [
            "not a uri",
            "https://example.org/?xt=urn:btih:0123",
            "magnet:?dn=missing-topic",
            "magnet:?xt=urn:btih:tooshort",
        ] {
            assert!(
                matches!(
                    magnet_info_hash(uri),
                    Err(TorrentParseError::InvalidMagnet { .. })
                ),
                "{uri} should be rejected"
            );
        }
    }

    #[test]
    fn built_magnets_round_trip() {
        let hash = "0123456789abcdef0123456789abcdef01234567";
        let uri = build_magnet(
            hash,
            "My Show S01 1080p",
            &["https://tracker.example.org/announce?pass=1", ""],
        );
        assert!(uri.starts_with("magnet:?xt=urn:btih:0123456789abcdef"));
        assert!(uri.contains("dn=My%20Show%20S01%201080p"));
        assert!(uri.contains("tr=https%3A%2F%2Ftracker.example.org%2Fannounce%3Fpass%3D1"));
        assert_eq!(magnet_info_hash(&uri).expect("round trip"), hash);
    }
}
