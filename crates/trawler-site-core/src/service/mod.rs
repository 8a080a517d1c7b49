//! Capability traits implemented by site drivers and the HTTP substrate.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SiteConfig;
use crate::definition::SiteDefinition;
use crate::error::{SiteError, SiteResult};
use crate::model::{SearchQuery, TorrentItem, UserInfo};

/// HTTP methods used by driver requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
}

/// Request body shapes a driver can produce.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// JSON payload.
    Json(serde_json::Value),
}

/// A single network request prepared by a driver, expressed neutrally so
/// the substrate can apply retry, failover, and session headers.
#[derive(Debug, Clone)]
pub struct DriverRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path relative to the site's base URL.
    pub path: String,
    /// Query parameters appended to the path.
    pub query: Vec<(String, String)>,
    /// Additional headers (auth headers included, set by the driver).
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<RequestBody>,
}

impl DriverRequest {
    /// GET request for `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// POST request for `path`.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            ..Self::get(path)
        }
    }

    /// Append one query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append one header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    /// Attach a form body.
    #[must_use]
    pub fn with_form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }
}

/// Maximum body excerpt carried in parse/transport errors.
const SNIPPET_LIMIT: usize = 200;

/// One network response handed back to the driver for parsing.
#[derive(Debug, Clone)]
pub struct DriverResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, when present.
    pub content_type: Option<String>,
    /// Raw response body.
    pub body: Vec<u8>,
    /// URL the response was ultimately served from (after redirects).
    pub final_url: Option<String>,
}

impl DriverResponse {
    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Truncated body excerpt for error diagnostics.
    #[must_use]
    pub fn snippet(&self) -> String {
        let text = self.text();
        let mut end = text.len().min(SNIPPET_LIMIT);
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

/// Transport abstraction drivers execute their requests through.
///
/// The concrete implementation lives in the HTTP substrate and layers
/// session headers, retry with backoff, mirror failover, and the circuit
/// breaker underneath this call.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// Perform one logical request for `site` and return the final response.
    async fn execute(&self, site: &str, request: DriverRequest) -> SiteResult<DriverResponse>;
}

/// Everything a driver constructor needs to assemble a driver instance.
#[derive(Clone)]
pub struct DriverContext {
    /// The declarative definition the driver is parameterised by.
    pub definition: Arc<SiteDefinition>,
    /// User-supplied instantiation (credentials, overrides).
    pub config: SiteConfig,
    /// Transport used for every network round-trip.
    pub http: Arc<dyn HttpExecutor>,
}

/// Wire-protocol encoder/decoder for one site schema.
///
/// Required methods cover the search path every schema supports; the
/// remaining capabilities default to [`SiteError::Unsupported`] so drivers
/// only implement what their wire format offers. The base site wrapper
/// probes optional capabilities through these defaults.
#[async_trait]
pub trait SiteDriver: Send + Sync {
    /// Definition the driver was built from.
    fn definition(&self) -> &Arc<SiteDefinition>;

    /// Build a search request from a neutral query.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::InvalidQuery`] when the query cannot be
    /// expressed in this schema.
    fn prepare_search(&self, query: &SearchQuery) -> SiteResult<DriverRequest>;

    /// Perform one network round-trip through the HTTP substrate.
    ///
    /// Does not retry; retries happen below, in the substrate.
    async fn execute(&self, request: DriverRequest) -> SiteResult<DriverResponse>;

    /// Decode a search listing. `source_site` is left unset on every item;
    /// the site wrapper fills it.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Parse`] for undecodable bodies and
    /// [`SiteError::InvalidCredentials`] when the body is a login page.
    fn parse_search(&self, response: &DriverResponse) -> SiteResult<Vec<TorrentItem>>;

    /// Build the download request for a listed torrent.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Unsupported`] when the schema cannot download.
    fn prepare_download(&self, _item: &TorrentItem) -> SiteResult<DriverRequest> {
        Err(SiteError::Unsupported {
            operation: "prepare_download",
        })
    }

    /// Validate and return raw torrent bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Parse`] when the payload is not a torrent.
    fn parse_download(&self, _response: &DriverResponse) -> SiteResult<Vec<u8>> {
        Err(SiteError::Unsupported {
            operation: "parse_download",
        })
    }

    /// Composite download: prepare, execute, validate.
    ///
    /// Drivers whose download URL needs an extra token round-trip override
    /// this; the base wrapper always goes through it.
    async fn download_torrent(&self, item: &TorrentItem) -> SiteResult<Vec<u8>> {
        let request = self.prepare_download(item)?;
        let response = self.execute(request).await?;
        self.parse_download(&response)
    }

    /// Build the (first) user-info request.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Unsupported`] unless the driver overrides it.
    fn prepare_user_info(&self) -> SiteResult<DriverRequest> {
        Err(SiteError::Unsupported {
            operation: "prepare_user_info",
        })
    }

    /// Decode a user-info response.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::Unsupported`] unless the driver overrides it.
    fn parse_user_info(&self, _response: &DriverResponse) -> SiteResult<UserInfo> {
        Err(SiteError::Unsupported {
            operation: "parse_user_info",
        })
    }

    /// Composite account fetch.
    ///
    /// The default runs the single prepare/execute/parse round-trip;
    /// definition-driven drivers override it to run their multi-step
    /// pipeline, and API drivers may fan sub-requests out concurrently.
    async fn get_user_info(&self) -> SiteResult<UserInfo> {
        let request = self.prepare_user_info()?;
        let response = self.execute(request).await?;
        self.parse_user_info(&response)
    }
}

/// Public face of one configured site, consumed by the orchestrator and the
/// user-info service. Implementations wrap a driver with rate limiting,
/// identity tagging, and uniform error context.
#[async_trait]
pub trait Site: Send + Sync {
    /// Site identifier (definition id, or config id for ad-hoc sites).
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Definition backing this site.
    fn definition(&self) -> &Arc<SiteDefinition>;

    /// Search the site; every returned item carries this site's id in
    /// `source_site`.
    async fn search(&self, query: &SearchQuery) -> SiteResult<Vec<TorrentItem>>;

    /// Fetch raw `.torrent` bytes for a listed item.
    async fn download_torrent(&self, item: &TorrentItem) -> SiteResult<Vec<u8>>;

    /// Fetch the authenticated account snapshot.
    async fn user_info(&self) -> SiteResult<UserInfo>;
}

impl std::fmt::Debug for dyn Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MinimalDriver {
        definition: Arc<SiteDefinition>,
    }

    #[async_trait]
    impl SiteDriver for MinimalDriver {
        fn definition(&self) -> &Arc<SiteDefinition> {
            &self.definition
        }

        fn prepare_search(&self, _query: &SearchQuery) -> SiteResult<DriverRequest> {
            Ok(DriverRequest::get("/torrents"))
        }

        async fn execute(&self, _request: DriverRequest) -> SiteResult<DriverResponse> {
            Ok(DriverResponse {
                status: 200,
                content_type: None,
                body: Vec::new(),
                final_url: None,
            })
        }

        fn parse_search(&self, _response: &DriverResponse) -> SiteResult<Vec<TorrentItem>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn optional_capabilities_default_to_unsupported() {
        let driver = MinimalDriver {
            definition: Arc::new(SiteDefinition::new(
                "stub",
                "Stub",
                crate::model::SiteSchema::Gazelle,
                &["https://stub.example.org"],
            )),
        };
        assert!(matches!(
            driver.prepare_user_info(),
            Err(SiteError::Unsupported { .. })
        ));
        assert!(matches!(
            driver.get_user_info().await,
            Err(SiteError::Unsupported { .. })
        ));
        let item = TorrentItem::default();
        assert!(matches!(
            driver.prepare_download(&item),
            Err(SiteError::Unsupported { .. })
        ));
    }

    #[test]
    fn request_builders_accumulate() {
        let request = DriverRequest::post("/api/search")
            .with_query("page", "1")
            .with_header("x-api-key", "secret")
            .with_json(serde_json::json!({"keyword": "ubuntu"}));
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.query.len(), 1);
        assert_eq!(request.headers.len(), 1);
        assert!(matches!(request.body, Some(RequestBody::Json(_))));
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let response = DriverResponse {
            status: 200,
            content_type: None,
            body: "错误".repeat(100).into_bytes(),
            final_url: None,
        };
        let snippet = response.snippet();
        assert!(snippet.len() <= 200);
        assert!(snippet.starts_with('错'));
    }
}
