//! # Settings
//!
//! Runtime configuration for the compspec binary, layered in this order:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, else `COMPSPEC_CONFIG`)
//! 3. `COMPSPEC_*` environment variables
//! 4. Command line flags (applied by the CLI)
//!
//! ```toml
//! media_type = "application/org.supercontainers.compspec"
//! cache_dir = "/var/cache/compspec"
//! timeout_secs = 10
//! max_attempts = 3
//! backoff_ms = 500
//! plain_http = false
//! host_root = "/"
//! ```

use crate::documents::validate_file_size;
use crate::fetch::FetchPolicy;
use compspec_core::primitives::{DEFAULT_MEDIA_TYPE, DEFAULT_ROOT_LABEL, MAX_DOCUMENT_SIZE};
use compspec_core::{CompspecError, GraphConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "COMPSPEC_CONFIG";

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Media type of the compatibility artifact layer.
    pub media_type: String,
    /// Label of the graph root node.
    pub root_label: String,
    /// Directory for cached artifacts. Must exist when set.
    pub cache_dir: Option<PathBuf>,
    /// Per-attempt timeout for schema and registry requests.
    pub timeout_secs: u64,
    /// Attempts per fetch, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number.
    pub backoff_ms: u64,
    /// Talk plain HTTP to registries (local development registries).
    pub plain_http: bool,
    /// Root of the filesystem extractors read host facts from.
    pub host_root: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            root_label: DEFAULT_ROOT_LABEL.to_string(),
            cache_dir: None,
            timeout_secs: 10,
            max_attempts: 1,
            backoff_ms: 500,
            plain_http: false,
            host_root: PathBuf::from("/"),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or `COMPSPEC_CONFIG`) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, CompspecError> {
        let from_env = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let mut settings = match path.map(Path::to_path_buf).or(from_env) {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Parse a TOML settings file.
    pub fn from_file(path: &Path) -> Result<Self, CompspecError> {
        validate_file_size(path, MAX_DOCUMENT_SIZE)?;
        let text = std::fs::read_to_string(path).map_err(|e| {
            CompspecError::Config(format!("Cannot read settings {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
            .map_err(|e| CompspecError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, CompspecError> {
        toml::from_str(text).map_err(|e| CompspecError::Config(e.to_string()))
    }

    /// Apply `COMPSPEC_*` overrides read through `lookup`.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(media_type) = lookup("COMPSPEC_MEDIA_TYPE") {
            self.media_type = media_type;
        }
        if let Some(dir) = lookup("COMPSPEC_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(root) = lookup("COMPSPEC_HOST_ROOT") {
            self.host_root = PathBuf::from(root);
        }
        if let Some(secs) = parse_override(&lookup, "COMPSPEC_TIMEOUT_SECS") {
            self.timeout_secs = secs;
        }
        if let Some(attempts) = parse_override(&lookup, "COMPSPEC_MAX_ATTEMPTS") {
            self.max_attempts = attempts;
        }
        if let Some(plain) = parse_override(&lookup, "COMPSPEC_PLAIN_HTTP") {
            self.plain_http = plain;
        }
    }

    /// Conventions passed into the graph engine.
    #[must_use]
    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            root_label: self.root_label.clone(),
        }
    }

    /// Timeout and retry policy for fetches.
    #[must_use]
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            max_attempts: self.max_attempts.max(1),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={}: not a valid value", key, raw);
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
