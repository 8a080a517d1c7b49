//! Error types for torrent metainfo handling.

use thiserror::Error;

/// Primary error type for metainfo and magnet operations.
#[derive(Debug, Error)]
pub enum TorrentParseError {
    /// Payload is not valid bencode.
    #[error("invalid bencode payload")]
    Bencode {
        /// Decoder failure detail.
        #[source]
        source: serde_bencode::Error,
    },
    /// Bencode decoded but the `info` dictionary is missing or malformed.
    #[error("metainfo is missing a valid info dictionary")]
    MissingInfo,
    /// Magnet URI could not be parsed or carries no `btih` hash.
    #[error("invalid magnet uri '{uri}'")]
    InvalidMagnet {
        /// Offending URI, truncated for logging.
        uri: String,
    },
    /// Fetched payload does not look like a torrent file.
    #[error("unexpected content type '{content_type}' for torrent payload")]
    UnexpectedContentType {
        /// Content type reported by the server.
        content_type: String,
    },
}

/// Convenience alias for metainfo results.
pub type TorrentParseResult<T> = Result<T, TorrentParseError>;
