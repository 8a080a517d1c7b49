//! Bencoded `.torrent` parsing and info-hash computation.

use serde::Deserialize;
use serde_bencode::value::Value;
use sha1::{Digest, Sha1};

use crate::error::{TorrentParseError, TorrentParseResult};

/// One file inside a multi-file torrent payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFileEntry {
    /// Path components joined with `/`.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
}

/// Decoded metainfo summary for a `.torrent` payload.
#[derive(Debug, Clone)]
pub struct TorrentMeta {
    /// Suggested name of the payload.
    pub name: String,
    /// 40-character lowercase hex SHA-1 of the bencoded `info` dictionary.
    pub info_hash: String,
    /// Total payload size in bytes.
    pub size: u64,
    /// Piece length in bytes.
    pub piece_length: u64,
    /// Primary announce URL, when present.
    pub announce: Option<String>,
    /// File listing; a single-file torrent yields one entry named after the
    /// payload.
    pub files: Vec<TorrentFileEntry>,
}

#[derive(Deserialize)]
struct RawMetainfo {
    info: RawInfo,
    #[serde(default)]
    announce: Option<String>,
}

#[derive(Deserialize)]
struct RawInfo {
    name: String,
    #[serde(rename = "piece length")]
    piece_length: i64,
    #[serde(default)]
    length: Option<i64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
}

#[derive(Deserialize)]
struct RawFile {
    length: i64,
    path: Vec<String>,
}

/// Compute the info-hash of a bencoded `.torrent` payload.
///
/// The raw `info` value is re-encoded before hashing; bencode dictionaries
/// are canonically key-sorted, so the round-trip is byte-identical and
/// unknown keys survive.
///
/// # Errors
///
/// Returns [`TorrentParseError::Bencode`] for undecodable payloads and
/// [`TorrentParseError::MissingInfo`] when there is no `info` dictionary.
pub fn compute_info_hash(bytes: &[u8]) -> TorrentParseResult<String> {
    let value: Value =
        serde_bencode::from_bytes(bytes).map_err(|source| TorrentParseError::Bencode { source })?;
    let Value::Dict(root) = value else {
        return Err(TorrentParseError::MissingInfo);
    };
    let info = root
        .get(b"info".as_slice())
        .ok_or(TorrentParseError::MissingInfo)?;
    if !matches!(info, Value::Dict(_)) {
        return Err(TorrentParseError::MissingInfo);
    }
    let encoded =
        serde_bencode::to_bytes(info).map_err(|source| TorrentParseError::Bencode { source })?;
    Ok(hex::encode(Sha1::digest(&encoded)))
}

/// Parse a `.torrent` payload into a [`TorrentMeta`] summary.
///
/// # Errors
///
/// Returns [`TorrentParseError::Bencode`] or
/// [`TorrentParseError::MissingInfo`] for malformed payloads.
pub fn parse_torrent(bytes: &[u8]) -> TorrentParseResult<TorrentMeta> {
    let info_hash = compute_info_hash(bytes)?;
    let raw: RawMetainfo =
        serde_bencode::from_bytes(bytes).map_err(|source| TorrentParseError::Bencode { source })?;

    let files: Vec<TorrentFileEntry> = match (&raw.info.files, raw.info.length) {
        (Some(entries), _) => entries
            .iter()
            .map(|file| TorrentFileEntry {
                path: file.path.join("/"),
                size: clamp_u64(file.length),
            })
            .collect(),
        (None, Some(length)) => vec![TorrentFileEntry {
            path: raw.info.name.clone(),
            size: clamp_u64(length),
        }],
        (None, None) => return Err(TorrentParseError::MissingInfo),
    };
    let size = files.iter().map(|file| file.size).sum();

    Ok(TorrentMeta {
        name: raw.info.name,
        info_hash,
        size,
        piece_length: clamp_u64(raw.info.piece_length),
        announce: raw.announce,
        files,
    })
}

/// Whether a response content type is acceptable for a torrent download.
///
/// Accepts `application/x-bittorrent` and `application/octet-stream`,
/// case-insensitively, ignoring any parameters.
#[must_use]
pub fn is_torrent_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        essence.as_str(),
        "application/x-bittorrent" | "application/octet-stream"
    )
}

fn clamp_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}
