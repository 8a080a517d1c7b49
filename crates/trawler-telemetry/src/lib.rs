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

//! Logging setup for Trawler processes and test harnesses.
//!
//! An aggregator's debug logs drown in scraping and transport internals:
//! the HTML parser, the CSS-selector engine, and the HTTP client stack all
//! trace far below anything a site operator needs. The default filter
//! therefore pins those targets to `warn` while the trawler crates follow
//! the configured level; a `RUST_LOG` environment variable overrides the
//! whole arrangement.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default logging level when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Dependency targets whose debug output is noise when polling sites.
const QUIET_TARGETS: &[&str] = &[
    "html5ever",
    "selectors",
    "scraper",
    "hyper_util",
    "reqwest",
    "rustls",
];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Level applied to the trawler crates (e.g. `info`, `debug`).
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    /// Emit logs as structured JSON objects.
    Json,
    /// Emit human-readable, pretty-printed logs.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be installed (for
/// example, because another subscriber has already been set globally).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(build_env_filter(config.level))
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .try_init()
            .map_err(|err| anyhow!("failed to install tracing subscriber: {err}")),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(build_env_filter(config.level))
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .try_init()
            .map_err(|err| anyhow!("failed to install tracing subscriber: {err}")),
    }
}

/// Filter directives for `level`, with the scraping and transport
/// internals pinned to `warn`.
fn default_directives(level: &str) -> String {
    let mut directives = String::from(level);
    for target in QUIET_TARGETS {
        directives.push(',');
        directives.push_str(target);
        directives.push_str("=warn");
    }
    directives
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_quiet_the_scraping_stack() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("debug,"));
        for target in ["html5ever", "selectors", "reqwest"] {
            assert!(
                directives.contains(&format!("{target}=warn")),
                "{target} not quieted in {directives}"
            );
        }
    }

    #[test]
    fn directives_parse_as_an_env_filter() {
        let filter = EnvFilter::new(default_directives(DEFAULT_LOG_LEVEL));
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn init_logging_tolerates_repeat_installs() {
        let config = LoggingConfig {
            level: "info",
            format: LogFormat::Pretty,
        };
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err(), "second install is refused");
    }
}
