//! Union scalar type flowing through filter pipelines.

/// A raw scraped value before and after filtering.
///
/// Every filter tolerates every shape; the coercion helpers define the
/// cross-type behaviour once.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Text value.
    Str(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Raw bytes (e.g. binary attribute payloads).
    Bytes(Vec<u8>),
}

impl Value {
    /// Coerce to a string; `Null` becomes the empty string and bytes are
    /// decoded lossily.
    #[must_use]
    pub fn to_str_value(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Str(text) => text.clone(),
            Self::Int(number) => number.to_string(),
            Self::Float(number) => {
                if number.fract().abs() < f64::EPSILON && number.abs() < 1e15 {
                    format!("{number:.0}")
                } else {
                    number.to_string()
                }
            }
            Self::Bool(flag) => flag.to_string(),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Coerce to a float; unparseable text and `Null` become `0.0`.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        match self {
            Self::Null | Self::Bytes(_) => 0.0,
            Self::Str(text) => text.trim().parse().unwrap_or(0.0),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(number) => *number as f64,
            Self::Float(number) => *number,
            Self::Bool(flag) => f64::from(u8::from(*flag)),
        }
    }

    /// Coerce to an integer, truncating floats; unparseable text becomes 0.
    #[must_use]
    pub fn to_i64(&self) -> i64 {
        match self {
            Self::Null | Self::Bytes(_) => 0,
            Self::Str(text) => {
                let trimmed = text.trim();
                if let Ok(number) = trimmed.parse::<i64>() {
                    number
                } else if let Ok(number) = trimmed.parse::<f64>() {
                    #[allow(clippy::cast_possible_truncation)]
                    let truncated = number as i64;
                    truncated
                } else {
                    0
                }
            }
            Self::Int(number) => *number,
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(number) => *number as i64,
            Self::Bool(flag) => i64::from(*flag),
        }
    }

    /// Whether the value is absent or an empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(text) => text.trim().is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Str(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Str(text)
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Self::Int(number)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::Float(number)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(*flag),
            serde_json::Value::Number(number) => number.as_i64().map_or_else(
                || Self::Float(number.as_f64().unwrap_or_default()),
                Self::Int,
            ),
            serde_json::Value::String(text) => Self::Str(text.clone()),
            other => Self::Str(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_coercions_cover_all_shapes() {
        assert_eq!(Value::Null.to_str_value(), "");
        assert_eq!(Value::Str("abc".into()).to_str_value(), "abc");
        assert_eq!(Value::Int(42).to_str_value(), "42");
        assert_eq!(Value::Float(1.5).to_str_value(), "1.5");
        assert_eq!(Value::Float(3.0).to_str_value(), "3");
        assert_eq!(Value::Bool(true).to_str_value(), "true");
        assert_eq!(Value::Bytes(b"xyz".to_vec()).to_str_value(), "xyz");
    }

    #[test]
    fn numeric_coercions_default_to_zero() {
        assert!((Value::Str("1.5".into()).to_f64() - 1.5).abs() < f64::EPSILON);
        assert!((Value::Str("junk".into()).to_f64()).abs() < f64::EPSILON);
        assert_eq!(Value::Str("123".into()).to_i64(), 123);
        assert_eq!(Value::Str("1.9".into()).to_i64(), 1);
        assert_eq!(Value::Null.to_i64(), 0);
        assert_eq!(Value::Bool(true).to_i64(), 1);
    }

    #[test]
    fn json_scalars_convert_directly() {
        assert_eq!(Value::from(&serde_json::json!("text")), Value::Str("text".into()));
        assert_eq!(Value::from(&serde_json::json!(7)), Value::Int(7));
        assert_eq!(Value::from(&serde_json::json!(2.5)), Value::Float(2.5));
        assert_eq!(Value::from(&serde_json::json!(null)), Value::Null);
    }

    #[test]
    fn emptiness_ignores_whitespace() {
        assert!(Value::Str("   ".into()).is_empty());
        assert!(!Value::Int(0).is_empty());
        assert!(Value::Null.is_empty());
    }
}
