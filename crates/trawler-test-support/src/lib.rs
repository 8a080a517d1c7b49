#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]
#![allow(unexpected_cfgs)]

//! Shared test helpers: a scripted HTTP stub server standing in for remote
//! tracker sites in integration suites.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use trawler_telemetry::{LogFormat, LoggingConfig, init_logging};

/// Install the pretty logger for an integration test.
///
/// Safe to call from every test: the first caller installs the
/// subscriber, later calls are no-ops.
pub fn init_test_logging() {
    let _ = init_logging(&LoggingConfig {
        level: "debug",
        format: LogFormat::Pretty,
    });
}

/// One canned response in a route script.
#[derive(Debug, Clone)]
pub struct StubResponse {
    /// Status code to serve.
    pub status: u16,
    /// `Content-Type` header.
    pub content_type: String,
    /// Response body.
    pub body: Vec<u8>,
    /// Artificial service delay before responding.
    pub delay: Duration,
}

impl StubResponse {
    /// 200 response with an HTML body.
    #[must_use]
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    /// 200 response with a JSON body.
    #[must_use]
    pub fn json(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "application/json".to_string(),
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    /// 200 response with raw torrent bytes.
    #[must_use]
    pub fn torrent(body: &[u8]) -> Self {
        Self {
            status: 200,
            content_type: "application/x-bittorrent".to_string(),
            body: body.to_vec(),
            delay: Duration::ZERO,
        }
    }

    /// Empty response with the given status.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            body: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    /// Add an artificial delay before the response is served.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One request observed by the stub server.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// Request path.
    pub path: String,
    /// Raw query string (no leading `?`).
    pub query: String,
    /// Request body decoded as UTF-8 (lossily).
    pub body: String,
    /// `Cookie` header, when sent.
    pub cookie: Option<String>,
    /// `x-api-key` header, when sent.
    pub api_key: Option<String>,
}

struct RouteScript {
    responses: Vec<StubResponse>,
    served: usize,
}

#[derive(Default)]
struct ServerState {
    routes: Mutex<HashMap<String, RouteScript>>,
    requests: Mutex<Vec<CapturedRequest>>,
}

/// Scripted HTTP server bound to an ephemeral local port.
///
/// Each route serves its scripted responses in order, repeating the last
/// one once the script is exhausted; unknown paths yield 404. Every request
/// is captured for assertions.
pub struct StubServer {
    address: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl StubServer {
    /// Start a server with the given route scripts.
    ///
    /// # Panics
    ///
    /// Panics when no local port can be bound; test-only code.
    pub async fn start(routes: Vec<(&str, Vec<StubResponse>)>) -> Self {
        let state = Arc::new(ServerState::default());
        {
            let mut map = state.routes.lock().expect("stub state poisoned");
            for (path, responses) in routes {
                map.insert(
                    path.to_string(),
                    RouteScript {
                        responses,
                        served: 0,
                    },
                );
            }
        }
        let router = Router::new()
            .fallback(any(serve))
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub server");
        let address = listener.local_addr().expect("stub server address");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Self {
            address,
            state,
            handle,
        }
    }

    /// Base URL of the server.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Number of requests served for `path`.
    #[must_use]
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .requests
            .lock()
            .expect("stub state poisoned")
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    /// All captured requests in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state
            .requests
            .lock()
            .expect("stub state poisoned")
            .clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let cookie = header_value(request.headers(), header::COOKIE.as_str());
    let api_key = header_value(request.headers(), "x-api-key");
    let body_bytes = to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    {
        let mut requests = state.requests.lock().expect("stub state poisoned");
        requests.push(CapturedRequest {
            path: path.clone(),
            query,
            body: String::from_utf8_lossy(&body_bytes).into_owned(),
            cookie,
            api_key,
        });
    }

    let scripted = {
        let mut routes = state.routes.lock().expect("stub state poisoned");
        routes.get_mut(&path).map(|script| {
            let index = script.served.min(script.responses.len().saturating_sub(1));
            script.served += 1;
            script.responses.get(index).cloned()
        })
    };
    match scripted {
        Some(Some(response)) => {
            if !response.delay.is_zero() {
                tokio::time::sleep(response.delay).await;
            }
            (
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                [(header::CONTENT_TYPE, response.content_type)],
                response.body,
            )
                .into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
