//! User-supplied site instantiation config.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SiteError, SiteResult};
use crate::model::SiteSchema;

/// One site instantiation request, deserialised from the external JSON
/// contract. `options` carries schema-specific material (cookie, API key,
/// selector overrides) and is interpreted by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// Schema the site speaks.
    #[serde(rename = "type")]
    pub schema: SiteSchema,
    /// Site identifier; usually a registered definition id or alias.
    pub id: String,
    /// Display name; defaults to the definition's name when empty.
    #[serde(default)]
    pub name: String,
    /// Base URL overriding the definition's primary locator.
    #[serde(default)]
    pub base_url: String,
    /// Opaque schema-specific options.
    #[serde(default)]
    pub options: Value,
    /// Override of the definition's sustained request rate.
    #[serde(default)]
    pub rate_limit: Option<f64>,
    /// Override of the definition's burst allowance.
    #[serde(default)]
    pub rate_burst: Option<u32>,
}

impl SiteConfig {
    /// Minimal config for tests and programmatic construction.
    #[must_use]
    pub fn new(schema: SiteSchema, id: impl Into<String>) -> Self {
        Self {
            schema,
            id: id.into(),
            name: String::new(),
            base_url: String::new(),
            options: Value::Null,
            rate_limit: None,
            rate_burst: None,
        }
    }

    /// Parse the external JSON contract: a single object or an array.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::InvalidQuery`] when the document is not valid
    /// JSON or does not match the contract.
    pub fn parse_json(text: &str) -> SiteResult<Vec<Self>> {
        let value: Value = serde_json::from_str(text).map_err(|err| SiteError::InvalidQuery {
            reason: format!("site config is not valid JSON: {err}"),
        })?;
        let configs = match value {
            Value::Array(_) => serde_json::from_value::<Vec<Self>>(value),
            Value::Object(_) => serde_json::from_value::<Self>(value).map(|config| vec![config]),
            other => {
                return Err(SiteError::InvalidQuery {
                    reason: format!("site config must be an object or array, got {other}"),
                });
            }
        }
        .map_err(|err| SiteError::InvalidQuery {
            reason: format!("site config does not match the contract: {err}"),
        })?;
        Ok(configs)
    }

    /// String-valued option by key, when present and non-empty.
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Require a non-empty string option, mapping absence to an
    /// *invalid-credentials* error naming the missing key.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::InvalidCredentials`] when the option is missing
    /// or empty.
    pub fn require_option(&self, key: &str) -> SiteResult<String> {
        self.option_str(key)
            .map(str::to_string)
            .ok_or_else(|| SiteError::InvalidCredentials {
                site: self.id.clone(),
                detail: format!("missing required option '{key}'"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object_and_array_both_parse() {
        let single = r#"{
            "type": "nexusphp",
            "id": "demo",
            "name": "Demo",
            "baseUrl": "https://demo.example.org",
            "options": {"cookie": "uid=1; pass=abc"},
            "rateLimit": 1.5
        }"#;
        let configs = SiteConfig::parse_json(single).expect("single object");
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].schema, SiteSchema::NexusPhp);
        assert_eq!(configs[0].option_str("cookie"), Some("uid=1; pass=abc"));
        assert_eq!(configs[0].rate_limit, Some(1.5));

        let array = format!("[{single}, {single}]");
        let configs = SiteConfig::parse_json(&array).expect("array");
        assert_eq!(configs.len(), 2);
    }

    #[test]
    fn scalar_documents_are_rejected() {
        assert!(SiteConfig::parse_json("42").is_err());
        assert!(SiteConfig::parse_json("not json").is_err());
    }

    #[test]
    fn missing_credentials_name_the_key() {
        let config = SiteConfig::new(SiteSchema::MTorrent, "mteam");
        let err = config.require_option("apiKey").unwrap_err();
        let SiteError::InvalidCredentials { site, detail } = err else {
            panic!("expected invalid credentials");
        };
        assert_eq!(site, "mteam");
        assert!(detail.contains("apiKey"));
    }
}
