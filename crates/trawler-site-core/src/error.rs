//! Error taxonomy shared across site drivers and services.

use thiserror::Error;

/// Primary error type for site operations.
///
/// Variants map one-to-one onto the semantic failure classes recognised by
/// the orchestrator and the user-info service; the HTTP substrate converts
/// its transport failures into these before they reach a caller.
#[derive(Debug, Error)]
pub enum SiteError {
    /// Caller-supplied arguments failed validation; surfaced before any I/O.
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// Human-readable validation failure.
        reason: String,
    },
    /// Authentication was rejected (401/403) or a required credential is
    /// missing. Never retried.
    #[error("invalid credentials for site '{site}': {detail}")]
    InvalidCredentials {
        /// Site the credentials belong to.
        site: String,
        /// What was rejected or missing.
        detail: String,
    },
    /// The caller's deadline expired while waiting on the token bucket.
    #[error("rate limit wait aborted for site '{site}'")]
    RateLimited {
        /// Site whose limiter was contended.
        site: String,
    },
    /// Network failure or retryable status that persisted through all
    /// retries. Carries a snippet of the last response body for diagnostics.
    #[error("transient http failure for site '{site}' (status {status:?})")]
    TransientHttp {
        /// Site the request was addressed to.
        site: String,
        /// Last observed HTTP status, when a response arrived at all.
        status: Option<u16>,
        /// Truncated body of the last failed response.
        snippet: String,
    },
    /// Response body could not be decoded. Never retried.
    #[error("failed to parse {what} from site '{site}'")]
    Parse {
        /// Site that produced the malformed payload.
        site: String,
        /// What was being decoded (e.g. `search listing`, `user info`).
        what: &'static str,
        /// Truncated body excerpt for debugging.
        snippet: String,
    },
    /// Circuit breaker is open; the request was rejected without I/O.
    #[error("circuit open for site '{site}' endpoint '{endpoint}'")]
    CircuitOpen {
        /// Site whose breaker tripped.
        site: String,
        /// Endpoint key the breaker tracks.
        endpoint: String,
    },
    /// Site has no configured URL, or all mirrors are exhausted.
    #[error("no usable url for site '{site}'")]
    NoUrls {
        /// Site without a usable locator.
        site: String,
    },
    /// Registry lookup failed.
    #[error("site '{site}' not found")]
    SiteNotFound {
        /// Missing site identifier.
        site: String,
    },
    /// Operation is not supported by the driver.
    #[error("site operation not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Driver-level failure wrapped with site and operation context by the
    /// base site wrapper.
    #[error("site '{site}' operation '{operation}' failed")]
    Operation {
        /// Site the operation ran against.
        site: String,
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<SiteError>,
    },
}

impl SiteError {
    /// Wrap an error with `{site, operation}` context unless it already
    /// carries one.
    #[must_use]
    pub fn with_context(self, site: &str, operation: &'static str) -> Self {
        match self {
            Self::Operation { .. } => self,
            other => Self::Operation {
                site: site.to_string(),
                operation,
                source: Box::new(other),
            },
        }
    }

    /// Whether the substrate may retry the failed request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientHttp { .. })
    }

    /// Innermost error once operation-context wrappers are unwound.
    #[must_use]
    pub fn root(&self) -> &Self {
        let mut current = self;
        while let Self::Operation { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Convenience alias for site operation results.
pub type SiteResult<T> = Result<T, SiteError>;
