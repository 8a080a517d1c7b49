//! Generic NexusPHP detail-page parser, parameterised by the definition's
//! `detail_parser` block. Used to enrich RSS feed items with promotion and
//! size data scraped from the single-torrent page.

use chrono::{NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use trawler_site_core::{DetailParserConfig, DiscountLevel, SiteDefinition, SiteError, SiteResult};

static DETAIL_SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([\d.,]+)\s*(KB|MB|GB|TB)").expect("detail size pattern compiles")
});

/// Fields scraped from one detail page.
#[derive(Debug, Clone, Default)]
pub struct TorrentDetail {
    /// Release title.
    pub title: String,
    /// Site-local torrent id.
    pub id: String,
    /// Promotion level in effect.
    pub discount_level: DiscountLevel,
    /// Unix timestamp at which the promotion lapses, when bounded.
    pub discount_end_time: Option<i64>,
    /// Payload size normalised to megabytes.
    pub size_mb: f64,
    /// Whether the page carries a hit-and-run marker.
    pub has_hr: bool,
}

/// Parse a detail page using the definition's `detail_parser` block.
///
/// # Errors
///
/// Returns [`SiteError::Unsupported`] when the definition declares no
/// detail parser and [`SiteError::Parse`] for unusable selectors.
pub fn parse_detail_page(definition: &SiteDefinition, html: &str) -> SiteResult<TorrentDetail> {
    let config = definition
        .detail_parser
        .as_ref()
        .ok_or(SiteError::Unsupported {
            operation: "parse_detail_page",
        })?;
    let document = Html::parse_document(html);
    let mut detail = TorrentDetail {
        title: select_text(&document, &definition.id, &config.title_selector)?
            .unwrap_or_default(),
        id: select_text(&document, &definition.id, &config.id_selector)?.unwrap_or_default(),
        ..TorrentDetail::default()
    };

    // Promotion: scan candidates in document order, first class hit wins.
    if !config.discount_selector.is_empty() {
        let selector = compile(&definition.id, &config.discount_selector)?;
        'candidates: for element in document.select(&selector) {
            for class in element.value().classes() {
                if let Some(level) = config.discount_classes.get(class) {
                    detail.discount_level = *level;
                    break 'candidates;
                }
            }
        }
    }

    if !config.end_time_selector.is_empty()
        && let Some(raw) = select_text(&document, &definition.id, &config.end_time_selector)?
    {
        detail.discount_end_time = parse_site_time(definition, config, &raw);
    }

    if !config.size_selector.is_empty() {
        let selector = compile(&definition.id, &config.size_selector)?;
        for element in document.select(&selector) {
            let text = element.text().collect::<Vec<_>>().join(" ");
            if let Some(captures) = DETAIL_SIZE_PATTERN.captures(&text) {
                let number: f64 = captures[1].replace(',', "").parse().unwrap_or_default();
                detail.size_mb = match captures[2].to_ascii_uppercase().as_str() {
                    "KB" => number / 1024.0,
                    "GB" => number * 1024.0,
                    "TB" => number * 1024.0 * 1024.0,
                    _ => number,
                };
                break;
            }
        }
    }

    let body_text = document.root_element().text().collect::<Vec<_>>().join(" ");
    detail.has_hr = config
        .hr_keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && body_text.contains(keyword.as_str()));

    Ok(detail)
}

fn parse_site_time(
    definition: &SiteDefinition,
    config: &DetailParserConfig,
    raw: &str,
) -> Option<i64> {
    let layout = if config.time_layout.is_empty() {
        "%Y-%m-%d %H:%M:%S"
    } else {
        config.time_layout.as_str()
    };
    let naive = NaiveDateTime::parse_from_str(raw.trim(), layout).ok()?;
    definition
        .timezone()
        .from_local_datetime(&naive)
        .single()
        .map(|stamp| stamp.timestamp())
}

fn compile(site: &str, selector: &str) -> SiteResult<Selector> {
    Selector::parse(selector).map_err(|_| SiteError::Parse {
        site: site.to_string(),
        what: "detail selector",
        snippet: selector.to_string(),
    })
}

fn select_text(document: &Html, site: &str, selector: &str) -> SiteResult<Option<String>> {
    if selector.is_empty() {
        return Ok(None);
    }
    let compiled = compile(site, selector)?;
    Ok(document.select(&compiled).next().map(|element| {
        element
            .attr("title")
            .map_or_else(
                || element.text().collect::<Vec<_>>().join(" "),
                str::to_string,
            )
            .trim()
            .to_string()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use trawler_site_core::SiteSchema;

    fn definition() -> SiteDefinition {
        let mut discount_classes = HashMap::new();
        discount_classes.insert("pro_free".to_string(), DiscountLevel::Free);
        discount_classes.insert("pro_free2up".to_string(), DiscountLevel::TwoXFree);
        SiteDefinition {
            detail_parser: Some(DetailParserConfig {
                time_layout: "%Y-%m-%d %H:%M:%S".to_string(),
                discount_classes,
                hr_keywords: vec!["H&R".to_string()],
                title_selector: "input[name='torrent_name']".to_string(),
                id_selector: "input[name='id']".to_string(),
                discount_selector: "h1#top img".to_string(),
                end_time_selector: "h1#top span[title]".to_string(),
                size_selector: "td.rowfollow".to_string(),
            }),
            timezone_offset: "+0800".to_string(),
            ..SiteDefinition::new(
                "detaildemo",
                "Detail Demo",
                SiteSchema::Gazelle,
                &["https://detaildemo.example.org"],
            )
        }
    }

    const PAGE: &str = r#"
        <html><body>
          <h1 id="top">
            <img class="pro_free" alt="Free" />
            <span title="2024-03-05 12:00:00">promotion ends</span>
          </h1>
          <input name="torrent_name" title="Great.Movie.2024.1080p.BluRay" />
          <input name="id" title="7801" />
          <table><tr>
            <td class="rowfollow">5.50 GB (5,905,580,032 bytes)</td>
            <td class="rowfollow">H&amp;R policy applies</td>
          </tr></table>
        </body></html>
    "#;

    #[test]
    fn detail_fields_are_scraped() {
        let detail = parse_detail_page(&definition(), PAGE).expect("parse");
        assert_eq!(detail.title, "Great.Movie.2024.1080p.BluRay");
        assert_eq!(detail.id, "7801");
        assert_eq!(detail.discount_level, DiscountLevel::Free);
        assert!((detail.size_mb - 5632.0).abs() < 0.01, "5.5GB in MB");
        assert!(detail.has_hr);
        // 2024-03-05 12:00 +0800 == 04:00 UTC.
        assert_eq!(detail.discount_end_time, Some(1_709_611_200));
    }

    #[test]
    fn unknown_discount_classes_fall_back_to_none() {
        let page = PAGE.replace("pro_free", "pro_mystery");
        let detail = parse_detail_page(&definition(), &page).expect("parse");
        assert_eq!(detail.discount_level, DiscountLevel::None);
    }

    #[test]
    fn missing_config_is_unsupported() {
        let mut definition = definition();
        definition.detail_parser = None;
        assert!(matches!(
            parse_detail_page(&definition, PAGE),
            Err(SiteError::Unsupported { .. })
        ));
    }
}
