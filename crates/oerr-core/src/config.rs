//! Harvest settings and store-path resolution.
//!
//! Settings come from an optional TOML file; anything left out keeps its
//! default. The store path is resolved separately because the CLI flag and
//! environment take precedence over any file.
//!
//! ## Example Configuration File
//!
//! ```toml
//! concurrency = 4
//! request_timeout_secs = 60
//! excluded_pages = ["title.htm", "preface.htm", "intro.htm", "index.htm", "glossary.htm"]
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Table of contents of the Oracle Database 11g error-message reference.
pub const DEFAULT_TOC_URL: &str = "http://docs.oracle.com/cd/B28359_01/server.111/b28278/toc.htm";

/// Store path used when neither flag nor environment names one.
pub const DEFAULT_STORE_PATH: &str = "oerr.db";

/// Environment variable naming the store path directly.
pub const STORE_PATH_ENV: &str = "OERR_DB";

/// Environment variable naming a home directory holding `data/oerr.db`.
pub const HOME_ENV: &str = "OERR_HOME";

/// Upper bound on simultaneous page fetches, whatever the file or flag says.
pub const MAX_CONCURRENCY: usize = 8;

/// Settings for one harvest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Maximum number of pages fetched at the same time
    pub concurrency: usize,
    /// Capacity of the message channel between harvester and sink
    pub channel_depth: usize,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// `User-Agent` header sent with every request
    pub user_agent: String,
    /// Page file names that never hold message entries
    pub excluded_pages: Vec<String>,
    /// Skip links that resolve outside the table of contents' directory
    pub same_directory_only: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            channel_depth: 8,
            request_timeout_secs: 30,
            user_agent: concat!("oerr/", env!("CARGO_PKG_VERSION")).to_string(),
            excluded_pages: ["title.htm", "preface.htm", "intro.htm", "index.htm"]
                .into_iter()
                .map(String::from)
                .collect(),
            same_directory_only: true,
        }
    }
}

impl HarvestConfig {
    /// Load settings from a TOML file, or defaults when `path` is `None`.
    ///
    /// A named file that does not exist is an error; a missing default is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)?;
        debug!(path = %path.display(), "Loaded harvest config");
        config.validated()
    }

    /// Clamp and check values that would otherwise stall or flood the pipeline.
    pub fn validated(mut self) -> Result<Self> {
        if self.channel_depth == 0 {
            return Err(Error::Config("channel_depth must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        self.concurrency = self.concurrency.clamp(1, MAX_CONCURRENCY);
        Ok(self)
    }

    /// Per-request timeout as a `Duration`.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Resolve the store path: explicit value, then `OERR_DB`, then `OERR_HOME`,
/// then the relative default.
pub fn resolve_store_path(explicit: Option<&Path>) -> PathBuf {
    resolve_store_path_with(explicit, |key| std::env::var(key).ok())
}

fn resolve_store_path_with<F>(explicit: Option<&Path>, env: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env(STORE_PATH_ENV).filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(path.trim());
    }
    if let Some(home) = env(HOME_ENV).filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(home.trim())
            .join("data")
            .join(DEFAULT_STORE_PATH);
    }
    PathBuf::from(DEFAULT_STORE_PATH)
}
