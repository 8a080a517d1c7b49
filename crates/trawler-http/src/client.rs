//! Session-aware HTTP client with retry and mirror-URL failover.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use tokio::time::sleep;
use tracing::{debug, warn};
use trawler_site_core::{
    DriverRequest, DriverResponse, HttpExecutor, HttpMethod, RequestBody, SiteError, SiteResult,
};
use url::Url;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::retry::RetryPolicy;
use crate::session::{SessionPool, SessionState};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Transport-level knobs for one client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-round-trip timeout.
    pub timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Circuit-breaker tuning shared by all endpoints of the site.
    pub breaker: BreakerConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// HTTP executor for one site: an ordered list of mirror base URLs with
/// last-known-good preference, retry with backoff, a per-endpoint circuit
/// breaker, and the session lifecycle gate.
pub struct FailoverClient {
    site: String,
    urls: Vec<Url>,
    preferred: AtomicUsize,
    client: ReqwestClient,
    policy: RetryPolicy,
    breaker_config: BreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    sessions: Arc<SessionPool>,
}

impl FailoverClient {
    /// Build a client over the site's mirror list.
    ///
    /// Unparseable URLs are skipped with a warning; an empty usable list is
    /// allowed and surfaces as *no-urls* at call time.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(
        site: impl Into<String>,
        urls: &[String],
        sessions: Arc<SessionPool>,
        policy: RetryPolicy,
        config: &HttpClientConfig,
    ) -> SiteResult<Self> {
        let site = site.into();
        let parsed: Vec<Url> = urls
            .iter()
            .filter_map(|raw| match Url::parse(raw) {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!(site = %site, url = %raw, %err, "skipping unparseable mirror url");
                    None
                }
            })
            .collect();
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|err| SiteError::TransientHttp {
                site: site.clone(),
                status: None,
                snippet: format!("failed to build http client: {err}"),
            })?;
        Ok(Self {
            site,
            urls: parsed,
            preferred: AtomicUsize::new(0),
            client,
            policy,
            breaker_config: config.breaker.clone(),
            breakers: Mutex::new(HashMap::new()),
            sessions,
        })
    }

    /// Session pool backing this client.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionPool> {
        &self.sessions
    }

    /// Rotate preference back to the primary URL; meant to be driven by a
    /// periodic health check.
    pub fn reset_preferred(&self) {
        self.preferred.store(0, Ordering::Relaxed);
    }

    async fn execute_with_retry(&self, request: &DriverRequest) -> SiteResult<DriverResponse> {
        let mut last_error: Option<SiteError> = None;
        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.backoff_delay(attempt);
                debug!(site = %self.site, attempt, ?delay, "backing off before retry");
                sleep(delay).await;
            }
            match self.try_mirrors(request).await {
                Ok(response) => {
                    let status = response.status;
                    if (200..300).contains(&status) {
                        return Ok(response);
                    }
                    if status == 401 || status == 403 {
                        self.sessions.mark_invalid(&self.site);
                        return Err(SiteError::InvalidCredentials {
                            site: self.site.clone(),
                            detail: format!("authentication rejected with status {status}"),
                        });
                    }
                    let error = SiteError::TransientHttp {
                        site: self.site.clone(),
                        status: Some(status),
                        snippet: response.snippet(),
                    };
                    if self.policy.is_retryable_status(status) {
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
                Err(error) => {
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SiteError::NoUrls {
            site: self.site.clone(),
        }))
    }

    /// Walk the mirror list from the last-known-good index until one
    /// yields a non-transient response (any 2xx, or a 4xx refusal).
    ///
    /// A reachable mirror answering with a retryable status is treated
    /// like an unreachable one: the next mirror is tried, and `preferred`
    /// is only recorded for non-transient answers. When every mirror is
    /// transient the last such response is handed back so the retry loop
    /// can classify it and back off.
    async fn try_mirrors(&self, request: &DriverRequest) -> SiteResult<DriverResponse> {
        if self.urls.is_empty() {
            return Err(SiteError::NoUrls {
                site: self.site.clone(),
            });
        }
        let preferred = self.preferred.load(Ordering::Relaxed) % self.urls.len();
        let mut last_error: Option<SiteError> = None;
        let mut last_transient: Option<DriverResponse> = None;
        for offset in 0..self.urls.len() {
            let index = (preferred + offset) % self.urls.len();
            match self.send_once(&self.urls[index], request).await {
                Ok(response) if self.policy.is_retryable_status(response.status) => {
                    warn!(
                        site = %self.site,
                        mirror = %self.urls[index],
                        status = response.status,
                        "mirror answered with a transient status"
                    );
                    last_transient = Some(response);
                }
                Ok(response) => {
                    self.preferred.store(index, Ordering::Relaxed);
                    return Ok(response);
                }
                Err(error) => {
                    warn!(
                        site = %self.site,
                        mirror = %self.urls[index],
                        %error,
                        "mirror attempt failed"
                    );
                    last_error = Some(error);
                }
            }
        }
        if let Some(response) = last_transient {
            return Ok(response);
        }
        Err(last_error.unwrap_or_else(|| SiteError::NoUrls {
            site: self.site.clone(),
        }))
    }

    async fn send_once(&self, base: &Url, request: &DriverRequest) -> SiteResult<DriverResponse> {
        let transport_error = |detail: String| SiteError::TransientHttp {
            site: self.site.clone(),
            status: None,
            snippet: detail,
        };
        let mut url = base
            .join(request.path.trim_start_matches('/'))
            .map_err(|err| SiteError::InvalidQuery {
                reason: format!("invalid request path '{}': {err}", request.path),
            })?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match &request.body {
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Json(value)) => builder.json(value),
            None => builder,
        };
        let response = builder
            .send()
            .await
            .map_err(|err| transport_error(err.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let final_url = Some(response.url().to_string());
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(err.to_string()))?
            .to_vec();
        Ok(DriverResponse {
            status,
            content_type,
            body,
            final_url,
        })
    }
}

#[async_trait]
impl HttpExecutor for FailoverClient {
    async fn execute(&self, site: &str, request: DriverRequest) -> SiteResult<DriverResponse> {
        let now = unix_now();
        if self.sessions.state(site, now) != SessionState::Active {
            return Err(SiteError::InvalidCredentials {
                site: site.to_string(),
                detail: "session is not active".to_string(),
            });
        }
        {
            let mut breakers = self.breakers.lock().expect("breaker map poisoned");
            let breaker = breakers
                .entry(request.path.clone())
                .or_insert_with(|| CircuitBreaker::new(self.breaker_config.clone()));
            if !breaker.allow(Instant::now()) {
                return Err(SiteError::CircuitOpen {
                    site: site.to_string(),
                    endpoint: request.path.clone(),
                });
            }
        }
        let result = self.execute_with_retry(&request).await;
        {
            let mut breakers = self.breakers.lock().expect("breaker map poisoned");
            if let Some(breaker) = breakers.get_mut(&request.path) {
                match &result {
                    Ok(_) => breaker.record_success(),
                    Err(SiteError::TransientHttp { .. } | SiteError::NoUrls { .. }) => {
                        breaker.record_failure(Instant::now());
                    }
                    Err(_) => {}
                }
            }
        }
        result
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}
