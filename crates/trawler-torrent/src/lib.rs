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
#![allow(clippy::module_name_repetitions)]
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! Torrent metainfo utilities: bencode parsing, info-hash computation,
//! magnet URI handling, and content-type validation.

mod error;
mod magnet;
mod metainfo;

pub use error::{TorrentParseError, TorrentParseResult};
pub use magnet::{build_magnet, magnet_info_hash};
pub use metainfo::{
    TorrentFileEntry, TorrentMeta, compute_info_hash, is_torrent_content_type, parse_torrent,
};
