//! Factory assembling ready-to-use sites from user configuration.

use std::sync::Arc;

use tracing::info;
use trawler_http::{FailoverClient, HttpClientConfig, RateLimiter, RetryPolicy, SessionPool};
use trawler_site_core::{
    HttpExecutor, Site, SiteConfig, SiteDefinition, SiteError, SiteResult, definition_registry,
    driver_registry, DriverContext,
};

use crate::base::BaseSite;
use crate::register_builtin;

/// Builds [`Site`] instances by combining the definition registry, the
/// driver registry, the HTTP substrate, and the base wrapper.
///
/// The factory owns the process-wide session pool; every site it creates
/// shares it, keyed by site id.
pub struct SiteFactory {
    sessions: Arc<SessionPool>,
    retry: RetryPolicy,
    http_config: HttpClientConfig,
}

impl SiteFactory {
    /// Factory with default retry and transport settings. Registers the
    /// built-in drivers and definitions as a side effect.
    #[must_use]
    pub fn new() -> Self {
        register_builtin();
        Self {
            sessions: Arc::new(SessionPool::default()),
            retry: RetryPolicy::default(),
            http_config: HttpClientConfig::default(),
        }
    }

    /// Override the retry policy applied to every created site.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override transport settings applied to every created site.
    #[must_use]
    pub fn with_http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Session pool shared by all sites from this factory.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionPool> {
        &self.sessions
    }

    /// Assemble one site from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::InvalidQuery`] for schema mismatches or
    /// unusable ad-hoc definitions, [`SiteError::InvalidCredentials`] when
    /// required credentials are missing, and transport construction errors
    /// from the substrate.
    pub fn create(&self, config: SiteConfig) -> SiteResult<Arc<dyn Site>> {
        let definition = self.resolve_definition(&config)?;

        let mut urls: Vec<String> = Vec::new();
        if !config.base_url.is_empty() {
            urls.push(config.base_url.clone());
        }
        for url in &definition.urls {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }

        let client = FailoverClient::new(
            config.id.clone(),
            &urls,
            Arc::clone(&self.sessions),
            self.retry.clone(),
            &self.http_config,
        )?;
        let http: Arc<dyn HttpExecutor> = Arc::new(client);

        if let Some(cookie) = config.option_str("cookie") {
            self.sessions.set_cookie(&config.id, cookie);
        }
        if let Some(api_key) = config.option_str("apiKey") {
            self.sessions.set_api_key(&config.id, api_key);
        }

        let limiter = RateLimiter::new(
            config.rate_limit.unwrap_or(definition.rate_limit),
            config.rate_burst.unwrap_or(definition.rate_burst),
        );
        let id = config.id.clone();
        let name = if config.name.is_empty() {
            definition.name.clone()
        } else {
            config.name.clone()
        };
        let context = DriverContext {
            definition: Arc::clone(&definition),
            config,
            http,
        };
        let driver = driver_registry().create(definition.schema, context)?;
        info!(site = %id, schema = %definition.schema, "site assembled");
        Ok(Arc::new(BaseSite::new(id, name, driver, limiter)))
    }

    fn resolve_definition(&self, config: &SiteConfig) -> SiteResult<Arc<SiteDefinition>> {
        if let Some(definition) = definition_registry().resolve(&config.id) {
            if definition.schema != config.schema {
                return Err(SiteError::InvalidQuery {
                    reason: format!(
                        "site '{}' is registered as schema '{}', config says '{}'",
                        config.id, definition.schema, config.schema
                    ),
                });
            }
            return Ok(definition);
        }
        // Unknown id: build an ad-hoc definition from the config alone.
        // Schemas that mandate selectors or pipelines fail validation here
        // with a descriptive error.
        let name = if config.name.is_empty() {
            config.id.clone()
        } else {
            config.name.clone()
        };
        let definition = SiteDefinition::new(
            &config.id,
            &name,
            config.schema,
            &[config.base_url.as_str()],
        );
        definition
            .validate()
            .map_err(|err| SiteError::InvalidQuery {
                reason: format!("ad-hoc definition for '{}' is unusable: {err}", config.id),
            })?;
        Ok(Arc::new(definition))
    }
}

impl Default for SiteFactory {
    fn default() -> Self {
        Self::new()
    }
}
