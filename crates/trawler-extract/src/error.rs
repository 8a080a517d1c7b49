//! Error types for the extraction engine.

use thiserror::Error;

/// Primary error type for selector and filter evaluation.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A filter pipeline referenced an unregistered filter name.
    #[error("unknown filter '{name}'")]
    UnknownFilter {
        /// Missing filter name.
        name: String,
    },
    /// A CSS selector failed to parse.
    #[error("invalid css selector '{selector}'")]
    InvalidSelector {
        /// Offending selector string.
        selector: String,
    },
}

/// Convenience alias for extraction results.
pub type ExtractResult<T> = Result<T, ExtractError>;
