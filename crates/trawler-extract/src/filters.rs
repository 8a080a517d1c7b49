//! Named value filters and the process-wide filter registry.
//!
//! Filter names are data: site definitions reference them as strings, so
//! the registry keys keep their wire spelling (`parseSize`, `regexReplace`)
//! rather than Rust identifiers.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use trawler_site_core::FilterCall;
use trawler_site_core::parse_size_string;

use crate::error::{ExtractError, ExtractResult};
use crate::value::Value;

/// Signature of a registered filter.
pub type FilterFn = fn(&Value, &[String]) -> Value;

static NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern compiles"));
static SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([\d.,]+)\s*([KMGT]i?B|B)").expect("size pattern compiles")
});
static DOUBAN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"douban\.com/subject/(\d+)").expect("douban pattern compiles"));
static IMDB_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(tt\d{7,8})").expect("imdb pattern compiles"));

static REGISTRY: Lazy<RwLock<HashMap<String, FilterFn>>> = Lazy::new(|| {
    let mut filters: HashMap<String, FilterFn> = HashMap::new();
    filters.insert("parseNumber".to_string(), filter_parse_number);
    filters.insert("parseSize".to_string(), filter_parse_size);
    filters.insert("parseTime".to_string(), filter_parse_time);
    filters.insert("querystring".to_string(), filter_querystring);
    filters.insert("split".to_string(), filter_split);
    filters.insert("prepend".to_string(), filter_prepend);
    filters.insert("append".to_string(), filter_append);
    filters.insert("replace".to_string(), filter_replace);
    filters.insert("trim".to_string(), filter_trim);
    filters.insert("regex".to_string(), filter_regex);
    filters.insert("regexReplace".to_string(), filter_regex_replace);
    filters.insert("default".to_string(), filter_default);
    filters.insert("multiply".to_string(), filter_multiply);
    filters.insert("divide".to_string(), filter_divide);
    filters.insert("sumRegexMatches".to_string(), filter_sum_regex_matches);
    filters.insert("extDoubanId".to_string(), filter_ext_douban_id);
    filters.insert("extImdbId".to_string(), filter_ext_imdb_id);
    RwLock::new(filters)
});

/// Register an additional filter under `name`.
///
/// Re-registering the identical function is a no-op.
///
/// # Panics
///
/// Panics when a different function is already registered under `name`.
pub fn register_filter(name: &str, filter: FilterFn) {
    let mut registry = REGISTRY.write().expect("filter registry poisoned");
    if let Some(existing) = registry.get(name) {
        if std::ptr::fn_addr_eq(*existing, filter) {
            return;
        }
        panic!("conflicting filter registration for '{name}'");
    }
    registry.insert(name.to_string(), filter);
}

/// Apply a filter pipeline left-to-right.
///
/// # Errors
///
/// Returns [`ExtractError::UnknownFilter`] when a call names an
/// unregistered filter.
pub fn apply_filters(value: Value, calls: &[FilterCall]) -> ExtractResult<Value> {
    let mut current = value;
    for call in calls {
        let filter = {
            REGISTRY
                .read()
                .expect("filter registry poisoned")
                .get(&call.name)
                .copied()
        }
        .ok_or_else(|| ExtractError::UnknownFilter {
            name: call.name.clone(),
        })?;
        current = filter(&current, &call.args);
    }
    Ok(current)
}

fn filter_parse_number(value: &Value, _args: &[String]) -> Value {
    let text = value.to_str_value().replace(',', "");
    NUMBER_PATTERN
        .find(&text)
        .and_then(|found| found.as_str().parse::<f64>().ok())
        .map_or(Value::Float(0.0), Value::Float)
}

fn filter_parse_size(value: &Value, _args: &[String]) -> Value {
    let text = value.to_str_value();
    let Some(captures) = SIZE_PATTERN.captures(&text) else {
        return Value::Int(0);
    };
    let number = captures[1].replace(',', "");
    let parsed = parse_size_string(&format!("{number}{}", &captures[2]))
        .and_then(|bytes| i64::try_from(bytes).ok())
        .unwrap_or_default();
    Value::Int(parsed)
}

const TIME_LAYOUTS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// `parseTime(layout?, offset?)`: unix seconds from a time string.
///
/// Numeric input is taken as unix seconds, or milliseconds when it is too
/// large to be seconds. String input tries the optional custom layout then
/// the stock layouts; naive times are anchored at `offset` (`±HHMM`) when
/// provided, UTC otherwise.
fn filter_parse_time(value: &Value, args: &[String]) -> Value {
    const MILLIS_THRESHOLD: i64 = 100_000_000_000;
    let text = value.to_str_value();
    let trimmed = text.trim();
    if let Ok(number) = trimmed.parse::<i64>() {
        let seconds = if number.abs() >= MILLIS_THRESHOLD {
            number / 1000
        } else {
            number
        };
        return Value::Int(seconds);
    }

    let (layout, offset_arg) = match args {
        [layout, offset, ..] => (Some(layout.as_str()), Some(offset.as_str())),
        [single] if single.starts_with('+') || single.starts_with('-') => {
            (None, Some(single.as_str()))
        }
        [single] => (Some(single.as_str()), None),
        [] => (None, None),
    };
    let offset = offset_arg
        .and_then(parse_offset)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("utc offset"));

    let naive = layout
        .and_then(|layout| NaiveDateTime::parse_from_str(trimmed, layout).ok())
        .or_else(|| {
            TIME_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDateTime::parse_from_str(trimmed, layout).ok())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        });
    naive
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map_or(Value::Int(0), |stamp| {
            Value::Int(stamp.with_timezone(&Utc).timestamp())
        })
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    if text.len() != 5 || !text.is_ascii() || !(text.starts_with('+') || text.starts_with('-')) {
        return None;
    }
    let sign = if text.starts_with('-') { -1i32 } else { 1 };
    let hours: i32 = text[1..3].parse().ok()?;
    let minutes: i32 = text[3..5].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// `querystring(key)`: value of `key` in the query portion of a URL or a
/// bare query string; empty string on a miss.
fn filter_querystring(value: &Value, args: &[String]) -> Value {
    let Some(key) = args.first() else {
        return Value::Str(String::new());
    };
    let text = value.to_str_value();
    let query = text
        .split_once('?')
        .map_or(text.as_str(), |(_, query)| query);
    let query = query.split('#').next().unwrap_or_default();
    let found = url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == key.as_str())
        .map(|(_, value)| value.into_owned());
    Value::Str(found.unwrap_or_default())
}

/// `split(sep, idx)`: the idx-th piece; negative idx counts from the end;
/// out of bounds yields the empty string.
fn filter_split(value: &Value, args: &[String]) -> Value {
    let (Some(separator), Some(index)) = (args.first(), args.get(1)) else {
        return value.clone();
    };
    let Ok(index) = index.parse::<i64>() else {
        return Value::Str(String::new());
    };
    let text = value.to_str_value();
    let parts: Vec<&str> = text.split(separator.as_str()).collect();
    let len = i64::try_from(parts.len()).unwrap_or(i64::MAX);
    let resolved = if index < 0 { len + index } else { index };
    let part = usize::try_from(resolved)
        .ok()
        .and_then(|position| parts.get(position))
        .copied()
        .unwrap_or_default();
    Value::Str(part.to_string())
}

fn filter_prepend(value: &Value, args: &[String]) -> Value {
    let prefix = args.first().map(String::as_str).unwrap_or_default();
    Value::Str(format!("{prefix}{}", value.to_str_value()))
}

fn filter_append(value: &Value, args: &[String]) -> Value {
    let suffix = args.first().map(String::as_str).unwrap_or_default();
    Value::Str(format!("{}{suffix}", value.to_str_value()))
}

fn filter_replace(value: &Value, args: &[String]) -> Value {
    let (Some(old), Some(new)) = (args.first(), args.get(1)) else {
        return value.clone();
    };
    Value::Str(value.to_str_value().replace(old.as_str(), new))
}

fn filter_trim(value: &Value, args: &[String]) -> Value {
    let text = value.to_str_value();
    let trimmed = args.first().map_or_else(
        || text.trim().to_string(),
        |chars| {
            text.trim_matches(|c: char| chars.contains(c))
                .to_string()
        },
    );
    Value::Str(trimmed)
}

/// `regex(pattern)`: first capture group, or the whole match when the
/// pattern has no groups; empty string on a miss.
fn filter_regex(value: &Value, args: &[String]) -> Value {
    let Some(pattern) = args.first() else {
        return value.clone();
    };
    let Ok(compiled) = Regex::new(pattern) else {
        return value.clone();
    };
    let text = value.to_str_value();
    let extracted = compiled.captures(&text).map(|captures| {
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|found| found.as_str().to_string())
            .unwrap_or_default()
    });
    Value::Str(extracted.unwrap_or_default())
}

fn filter_regex_replace(value: &Value, args: &[String]) -> Value {
    let (Some(pattern), Some(replacement)) = (args.first(), args.get(1)) else {
        return value.clone();
    };
    let Ok(compiled) = Regex::new(pattern) else {
        return value.clone();
    };
    Value::Str(
        compiled
            .replace_all(&value.to_str_value(), replacement.as_str())
            .into_owned(),
    )
}

fn filter_default(value: &Value, args: &[String]) -> Value {
    if value.is_empty() {
        Value::Str(args.first().cloned().unwrap_or_default())
    } else {
        value.clone()
    }
}

fn filter_multiply(value: &Value, args: &[String]) -> Value {
    let Some(factor) = args.first().and_then(|arg| arg.parse::<f64>().ok()) else {
        return value.clone();
    };
    Value::Float(value.to_f64() * factor)
}

/// `divide(k)`: division by zero returns the input unchanged.
fn filter_divide(value: &Value, args: &[String]) -> Value {
    let Some(divisor) = args.first().and_then(|arg| arg.parse::<f64>().ok()) else {
        return value.clone();
    };
    if divisor.abs() < f64::EPSILON {
        return value.clone();
    }
    Value::Float(value.to_f64() / divisor)
}

/// `sumRegexMatches(pattern)`: sum of the first capture group across all
/// matches, e.g. "3 new and 2 system messages" with `(\d+)` gives 5.
fn filter_sum_regex_matches(value: &Value, args: &[String]) -> Value {
    let Some(pattern) = args.first() else {
        return Value::Float(0.0);
    };
    let Ok(compiled) = Regex::new(pattern) else {
        return Value::Float(0.0);
    };
    let text = value.to_str_value();
    let total: f64 = compiled
        .captures_iter(&text)
        .filter_map(|captures| captures.get(1))
        .filter_map(|group| group.as_str().replace(',', "").parse::<f64>().ok())
        .sum();
    Value::Float(total)
}

fn filter_ext_douban_id(value: &Value, _args: &[String]) -> Value {
    let text = value.to_str_value();
    let id = DOUBAN_PATTERN
        .captures(&text)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().to_string());
    Value::Str(id.unwrap_or_default())
}

fn filter_ext_imdb_id(value: &Value, _args: &[String]) -> Value {
    let text = value.to_str_value();
    let id = IMDB_PATTERN
        .captures(&text)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().to_string());
    Value::Str(id.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[&str]) -> FilterCall {
        FilterCall::new(name, args)
    }

    fn run(value: Value, calls: &[FilterCall]) -> Value {
        apply_filters(value, calls).expect("known filters")
    }

    #[test]
    fn parse_number_strips_commas_and_suffixes() {
        let value = run(Value::from("1,234.5 GB uploaded"), &[call("parseNumber", &[])]);
        assert_eq!(value, Value::Float(1234.5));
        assert_eq!(
            run(Value::from("no digits"), &[call("parseNumber", &[])]),
            Value::Float(0.0)
        );
    }

    #[test]
    fn parse_size_reads_embedded_sizes() {
        let value = run(Value::from("Size: 1.5 GB (freeleech)"), &[call("parseSize", &[])]);
        assert_eq!(value, Value::Int(1_610_612_736));
        assert_eq!(run(Value::from("n/a"), &[call("parseSize", &[])]), Value::Int(0));
    }

    #[test]
    fn parse_time_accepts_documented_shapes() {
        assert_eq!(
            run(Value::from("2024-03-01 12:30:00"), &[call("parseTime", &[])]),
            Value::Int(1_709_296_200)
        );
        assert_eq!(
            run(Value::from("2024/03/01 12:30"), &[call("parseTime", &[])]),
            Value::Int(1_709_296_200)
        );
        assert_eq!(
            run(Value::from("1709296200"), &[call("parseTime", &[])]),
            Value::Int(1_709_296_200)
        );
        assert_eq!(
            run(Value::from("1709296200123"), &[call("parseTime", &[])]),
            Value::Int(1_709_296_200)
        );
        // A +0800 site renders local time; the unix stamp shifts back.
        assert_eq!(
            run(
                Value::from("2024-03-01 20:30:00"),
                &[call("parseTime", &["+0800"])]
            ),
            Value::Int(1_709_296_200)
        );
    }

    #[test]
    fn querystring_reads_urls_and_bare_queries() {
        assert_eq!(
            run(
                Value::from("https://demo.example.org/details.php?id=42&hit=1"),
                &[call("querystring", &["id"])]
            ),
            Value::Str("42".into())
        );
        assert_eq!(
            run(Value::from("id=7&x=1"), &[call("querystring", &["x"])]),
            Value::Str("1".into())
        );
        assert_eq!(
            run(Value::from("id=7"), &[call("querystring", &["missing"])]),
            Value::Str(String::new())
        );
    }

    #[test]
    fn split_supports_negative_indices() {
        let value = Value::from("a / b / c");
        assert_eq!(
            run(value.clone(), &[call("split", &[" / ", "1"])]),
            Value::Str("b".into())
        );
        assert_eq!(
            run(value.clone(), &[call("split", &[" / ", "-1"])]),
            Value::Str("c".into())
        );
        assert_eq!(
            run(value, &[call("split", &[" / ", "9"])]),
            Value::Str(String::new())
        );
    }

    #[test]
    fn text_filters_compose_left_to_right() {
        let value = run(
            Value::from("  bonus: 1,024  "),
            &[
                call("trim", &[]),
                call("replace", &["bonus: ", ""]),
                call("parseNumber", &[]),
                call("multiply", &["2"]),
                call("divide", &["4"]),
            ],
        );
        assert_eq!(value, Value::Float(512.0));
    }

    #[test]
    fn divide_by_zero_returns_input() {
        let value = run(Value::Float(8.0), &[call("divide", &["0"])]);
        assert_eq!(value, Value::Float(8.0));
    }

    #[test]
    fn regex_prefers_first_capture_group() {
        assert_eq!(
            run(
                Value::from("uploaded 42 torrents"),
                &[call("regex", &[r"uploaded (\d+)"])]
            ),
            Value::Str("42".into())
        );
        assert_eq!(
            run(Value::from("uploaded 42"), &[call("regex", &[r"\d+"])]),
            Value::Str("42".into())
        );
        assert_eq!(
            run(Value::from("nothing"), &[call("regex", &[r"(\d+)"])]),
            Value::Str(String::new())
        );
    }

    #[test]
    fn sum_regex_matches_totals_message_counts() {
        let value = run(
            Value::from("You have 3 new and 2 system messages"),
            &[call("sumRegexMatches", &[r"(\d+)"])],
        );
        assert_eq!(value, Value::Float(5.0));
    }

    #[test]
    fn id_extractors_pull_from_urls() {
        assert_eq!(
            run(
                Value::from("https://movie.douban.com/subject/1292052/"),
                &[call("extDoubanId", &[])]
            ),
            Value::Str("1292052".into())
        );
        assert_eq!(
            run(
                Value::from("https://www.imdb.com/title/tt0111161/"),
                &[call("extImdbId", &[])]
            ),
            Value::Str("tt0111161".into())
        );
    }

    #[test]
    fn default_fills_only_empty_values() {
        assert_eq!(
            run(Value::Null, &[call("default", &["0"])]),
            Value::Str("0".into())
        );
        assert_eq!(
            run(Value::from("kept"), &[call("default", &["0"])]),
            Value::Str("kept".into())
        );
    }

    #[test]
    fn unknown_filters_error() {
        let err = apply_filters(Value::Null, &[call("nope", &[])]).unwrap_err();
        assert!(matches!(err, ExtractError::UnknownFilter { .. }));
    }
}
