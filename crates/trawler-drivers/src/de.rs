//! Serde helpers for JSON APIs whose numeric fields arrive as strings.
//!
//! M-Team in particular serialises counters (`seederCount`, `unMake`,
//! `finalBs`) as strings; every numeric field must tolerate `"123"` and
//! `123`, `"1.5"` and `1.5`, and `null`.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Flexible {
    Int(i64),
    Float(f64),
    Text(String),
    Flag(bool),
}

impl Flexible {
    fn as_f64(&self) -> f64 {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(number) => *number as f64,
            Self::Float(number) => *number,
            Self::Text(text) => text.trim().parse().unwrap_or(0.0),
            Self::Flag(flag) => f64::from(u8::from(*flag)),
        }
    }
}

/// Deserialize a `u64` from a number, a numeric string, or `null`.
///
/// # Errors
///
/// Propagates only structural deserializer errors; unparseable values
/// decode as zero.
pub(crate) fn flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Flexible>::deserialize(deserializer)?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let converted = value.map_or(0, |flexible| flexible.as_f64().max(0.0).round() as u64);
    Ok(converted)
}

/// Deserialize a `u32` from a number, a numeric string, or `null`.
///
/// # Errors
///
/// Propagates only structural deserializer errors.
pub(crate) fn flexible_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    flexible_u64(deserializer).map(|number| u32::try_from(number).unwrap_or(u32::MAX))
}

/// Deserialize an `f64` from a number, a numeric string, or `null`.
///
/// # Errors
///
/// Propagates only structural deserializer errors.
pub(crate) fn flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Flexible>::deserialize(deserializer)?;
    Ok(value.as_ref().map_or(0.0, Flexible::as_f64))
}

/// Deserialize an optional string, mapping `null` to `None`.
///
/// # Errors
///
/// Propagates only structural deserializer errors.
pub(crate) fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Row {
        #[serde(deserialize_with = "flexible_u64", default)]
        seeders: u64,
        #[serde(deserialize_with = "flexible_f64", default)]
        ratio: f64,
        #[serde(deserialize_with = "flexible_u32", default)]
        leechers: u32,
    }

    #[test]
    fn strings_and_numbers_both_decode() {
        let row: Row =
            serde_json::from_str(r#"{"seeders":"123","ratio":1.5,"leechers":7}"#).expect("decode");
        assert_eq!(row.seeders, 123);
        assert!((row.ratio - 1.5).abs() < f64::EPSILON);
        assert_eq!(row.leechers, 7);

        let row: Row =
            serde_json::from_str(r#"{"seeders":456,"ratio":"2.25","leechers":"9"}"#).expect("decode");
        assert_eq!(row.seeders, 456);
        assert!((row.ratio - 2.25).abs() < f64::EPSILON);
        assert_eq!(row.leechers, 9);
    }

    #[test]
    fn nulls_and_junk_default_to_zero() {
        let row: Row = serde_json::from_str(r#"{"seeders":null,"ratio":"n/a","leechers":null}"#)
            .expect("decode");
        assert_eq!(row.seeders, 0);
        assert!(row.ratio.abs() < f64::EPSILON);
        assert_eq!(row.leechers, 0);
    }
}
