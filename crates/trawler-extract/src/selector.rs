//! Application of declarative field selectors to HTML documents and JSON
//! payloads.

use scraper::{ElementRef, Html, Selector};
use trawler_site_core::FieldSelector;

use crate::error::{ExtractError, ExtractResult};
use crate::filters::apply_filters;
use crate::value::Value;

/// Extract one field from a parsed HTML document.
///
/// Candidate selectors are tried in order until one yields a non-empty raw
/// value; the filter pipeline for the matching selector index is then
/// applied. Yields [`Value::Null`] when nothing matches.
///
/// # Errors
///
/// Returns [`ExtractError::InvalidSelector`] for unparseable CSS and
/// [`ExtractError::UnknownFilter`] from the filter pipeline.
pub fn select_from_document(document: &Html, field: &FieldSelector) -> ExtractResult<Value> {
    select_scoped(document.root_element(), field)
}

/// Extract one field scoped to an element subtree (e.g. one listing row).
///
/// # Errors
///
/// Same failure modes as [`select_from_document`].
pub fn select_from_element(element: ElementRef<'_>, field: &FieldSelector) -> ExtractResult<Value> {
    select_scoped(element, field)
}

fn select_scoped(scope: ElementRef<'_>, field: &FieldSelector) -> ExtractResult<Value> {
    for (index, selector) in field.selectors.iter().enumerate() {
        let compiled =
            Selector::parse(selector).map_err(|_| ExtractError::InvalidSelector {
                selector: selector.clone(),
            })?;
        for element in scope.select(&compiled) {
            let raw = raw_value(element, field.attr.as_deref());
            if raw.trim().is_empty() {
                continue;
            }
            return apply_filters(Value::Str(raw), field.filters_for(index));
        }
    }
    Ok(Value::Null)
}

fn raw_value(element: ElementRef<'_>, attr: Option<&str>) -> String {
    attr.map_or_else(
        || element.text().collect::<Vec<_>>().join(" ").trim().to_string(),
        |name| element.attr(name).unwrap_or_default().trim().to_string(),
    )
}

/// Extract one field from a decoded JSON payload.
///
/// Selectors are interpreted as dot-paths (`data.memberCount`); numeric
/// segments index arrays. The first path resolving to a non-null scalar
/// wins.
///
/// # Errors
///
/// Returns [`ExtractError::UnknownFilter`] from the filter pipeline.
pub fn select_from_json(root: &serde_json::Value, field: &FieldSelector) -> ExtractResult<Value> {
    for (index, path) in field.selectors.iter().enumerate() {
        if let Some(node) = json_path(root, path) {
            let value = Value::from(node);
            if value.is_empty() {
                continue;
            }
            return apply_filters(value, field.filters_for(index));
        }
    }
    Ok(Value::Null)
}

/// Walk a dot-path into a JSON document.
#[must_use]
pub fn json_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawler_site_core::FilterCall;

    const PROFILE: &str = r#"
        <html><body>
          <table class="mainouter">
            <tr><td class="rowhead">Uploaded</td><td class="rowfollow">1.50 TB</td></tr>
            <tr><td class="rowhead">Bonus</td><td id="bonus">12,345.6</td></tr>
          </table>
          <a class="username" href="userdetails.php?id=4321"><b>seeder42</b></a>
        </body></html>
    "#;

    #[test]
    fn first_matching_selector_wins() {
        let document = Html::parse_document(PROFILE);
        let field = FieldSelector::css(&["td.missing", "a.username b"]);
        let value = select_from_document(&document, &field).expect("select");
        assert_eq!(value, Value::Str("seeder42".into()));
    }

    #[test]
    fn attr_extraction_feeds_the_pipeline() {
        let document = Html::parse_document(PROFILE);
        let field = FieldSelector::css(&["a.username"])
            .with_attr("href")
            .with_filter("querystring", &["id"]);
        let value = select_from_document(&document, &field).expect("select");
        assert_eq!(value, Value::Str("4321".into()));
    }

    #[test]
    fn switch_filters_follow_the_matching_index() {
        let document = Html::parse_document(PROFILE);
        let mut field = FieldSelector::css(&["td.nothere", "#bonus"]);
        field.filters = vec![FilterCall::new("parseSize", &[])];
        field
            .switch_filters
            .insert(1, vec![FilterCall::new("parseNumber", &[])]);
        let value = select_from_document(&document, &field).expect("select");
        assert_eq!(value, Value::Float(12_345.6));
    }

    #[test]
    fn missing_fields_yield_null() {
        let document = Html::parse_document(PROFILE);
        let field = FieldSelector::css(&["span.absent"]);
        assert_eq!(
            select_from_document(&document, &field).expect("select"),
            Value::Null
        );
    }

    #[test]
    fn invalid_css_is_reported() {
        let document = Html::parse_document(PROFILE);
        let field = FieldSelector::css(&["td:::"]);
        assert!(matches!(
            select_from_document(&document, &field),
            Err(ExtractError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn json_paths_walk_objects_and_arrays() {
        let payload = serde_json::json!({
            "data": {
                "memberCount": "1024",
                "torrents": [{"seeders": 7}]
            }
        });
        let field = FieldSelector::css(&["data.memberCount"]);
        assert_eq!(
            select_from_json(&payload, &field).expect("select"),
            Value::Str("1024".into())
        );
        let nested = FieldSelector::css(&["data.torrents.0.seeders"]);
        assert_eq!(
            select_from_json(&payload, &nested).expect("select"),
            Value::Int(7)
        );
        let missing = FieldSelector::css(&["data.absent", "data.torrents.0.seeders"]);
        assert_eq!(
            select_from_json(&payload, &missing).expect("select"),
            Value::Int(7)
        );
    }
}
