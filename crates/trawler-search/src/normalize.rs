//! Release-title normalization applied before merging results.

use once_cell::sync::Lazy;
use regex::Regex;

static SITE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[^\]]{1,40}\]\s*").expect("site tag pattern compiles"));
static RES_1080: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b1080p\b").expect("1080p pattern compiles"));
static RES_720: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b720p\b").expect("720p pattern compiles"));
static RES_2160: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:2160p|4k|uhd)\b").expect("2160p pattern compiles"));
static RES_SD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bSD\b").expect("sd pattern compiles"));
static CODEC_H264: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:x\.?264|h\.?264|avc)\b").expect("h264 pattern compiles"));
static CODEC_H265: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:x\.?265|h\.?265|hevc)\b").expect("h265 pattern compiles"));
static SRC_BLURAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:blu-?ray|bdrip|bdremux)\b").expect("bluray pattern compiles")
});
static SRC_WEBDL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bweb-?dl\b").expect("webdl pattern compiles"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern compiles"));

/// Canonicalise one release title.
///
/// Strips a leading `[SiteTag]`, rewrites resolution, codec, and container
/// tokens to their canonical spellings, and collapses whitespace runs.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let mut text = SITE_TAG.replace(title, "").into_owned();
    text = RES_2160.replace_all(&text, "2160p").into_owned();
    text = RES_1080.replace_all(&text, "1080p").into_owned();
    text = RES_720.replace_all(&text, "720p").into_owned();
    text = RES_SD.replace_all(&text, "480p").into_owned();
    text = CODEC_H264.replace_all(&text, "H.264").into_owned();
    text = CODEC_H265.replace_all(&text, "H.265").into_owned();
    text = SRC_BLURAY.replace_all(&text, "BluRay").into_owned();
    text = SRC_WEBDL.replace_all(&text, "WEB-DL").into_owned();
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_tags_are_stripped() {
        assert_eq!(
            normalize_title("[HDSky] Demo.Movie.2024.1080p"),
            "Demo.Movie.2024.1080p"
        );
        assert_eq!(normalize_title("No Tag Here"), "No Tag Here");
    }

    #[test]
    fn resolution_tokens_are_canonical() {
        assert_eq!(normalize_title("Show S01 1080P x264"), "Show S01 1080p H.264");
        assert_eq!(normalize_title("Movie 4K HDR"), "Movie 2160p HDR");
        assert_eq!(normalize_title("Movie UHD remux"), "Movie 2160p remux");
        assert_eq!(normalize_title("Old Film SD"), "Old Film 480p");
    }

    #[test]
    fn codec_and_container_tokens_are_canonical() {
        assert_eq!(normalize_title("Movie HEVC"), "Movie H.265");
        assert_eq!(normalize_title("Movie h264"), "Movie H.264");
        assert_eq!(normalize_title("Movie AVC Blu-Ray"), "Movie H.264 BluRay");
        assert_eq!(normalize_title("Movie BDRemux"), "Movie BluRay");
        assert_eq!(normalize_title("Show WEBDL"), "Show WEB-DL");
        assert_eq!(normalize_title("Show WEB-DL"), "Show WEB-DL");
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(normalize_title("  Too   many    spaces "), "Too many spaces");
    }
}
