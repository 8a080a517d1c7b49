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

//! Contract for the external download agent (qBittorrent, Transmission).
//!
//! The core hands fetched torrent bytes to an implementation of
//! [`Downloader`]; concrete adapters live outside this workspace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primary error type for downloader operations.
#[derive(Debug, Error)]
pub enum DownloaderError {
    /// The referenced torrent does not exist in the download agent.
    #[error("torrent '{id}' not found")]
    TorrentNotFound {
        /// Missing torrent identifier (hash or client id).
        id: String,
    },
    /// The download agent rejected the request or is unreachable.
    #[error("downloader operation failed")]
    OperationFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Convenience alias for downloader results.
pub type DownloaderResult<T> = Result<T, DownloaderError>;

/// Placement and lifecycle options accompanying an added torrent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTorrentOptions {
    /// Client-side category.
    #[serde(default)]
    pub category: Option<String>,
    /// Client-side tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Download directory override.
    #[serde(default)]
    pub save_path: Option<String>,
    /// Start the transfer immediately.
    #[serde(default)]
    pub autostart: bool,
}

/// Transfer state reported by the download agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Queued or checking.
    Queued,
    /// Actively downloading.
    Downloading,
    /// Complete and seeding.
    Seeding,
    /// Paused by the user or the agent.
    Paused,
    /// Errored in the agent.
    Errored,
}

/// Snapshot of one torrent inside the download agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTorrent {
    /// Agent-side identifier (usually the info-hash).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Transfer state.
    pub state: TransferState,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// Total payload size in bytes.
    pub size_bytes: u64,
}

/// External download agent contract consumed by the core.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Hand raw torrent bytes to the agent.
    async fn add_torrent(&self, torrent: Vec<u8>, options: AddTorrentOptions)
    -> DownloaderResult<()>;

    /// Pause a transfer.
    async fn pause_torrent(&self, id: &str) -> DownloaderResult<()>;

    /// Resume a transfer.
    async fn resume_torrent(&self, id: &str) -> DownloaderResult<()>;

    /// Remove a transfer, optionally deleting payload data.
    async fn remove_torrent(&self, id: &str, with_data: bool) -> DownloaderResult<()>;

    /// All transfers known to the agent.
    async fn get_all_torrents(&self) -> DownloaderResult<Vec<ClientTorrent>>;

    /// Free bytes on the agent's download volume.
    async fn get_free_space(&self) -> DownloaderResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyAgent;

    #[async_trait]
    impl Downloader for EmptyAgent {
        async fn add_torrent(
            &self,
            _torrent: Vec<u8>,
            _options: AddTorrentOptions,
        ) -> DownloaderResult<()> {
            Ok(())
        }

        async fn pause_torrent(&self, id: &str) -> DownloaderResult<()> {
            Err(DownloaderError::TorrentNotFound { id: id.to_string() })
        }

        async fn resume_torrent(&self, id: &str) -> DownloaderResult<()> {
            Err(DownloaderError::TorrentNotFound { id: id.to_string() })
        }

        async fn remove_torrent(&self, id: &str, _with_data: bool) -> DownloaderResult<()> {
            Err(DownloaderError::TorrentNotFound { id: id.to_string() })
        }

        async fn get_all_torrents(&self) -> DownloaderResult<Vec<ClientTorrent>> {
            Ok(Vec::new())
        }

        async fn get_free_space(&self) -> DownloaderResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn not_found_sentinel_carries_the_id() {
        let agent = EmptyAgent;
        let error = agent.pause_torrent("abc123").await.unwrap_err();
        let DownloaderError::TorrentNotFound { id } = error else {
            panic!("expected sentinel");
        };
        assert_eq!(id, "abc123");
    }
}
