//! Configuration file parser for ~/.config/stockroom/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::category::{SortKey, SortOrder};

/// Environment variable that overrides `api_token` from the file.
pub const API_TOKEN_ENV: &str = "STOCKROOM_API_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// Every key is optional. `api_token` is masked in `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the category REST API. When unset the local SQLite store is used.
    pub api_url: Option<String>,

    /// Bearer token for the REST API. `STOCKROOM_API_TOKEN` takes precedence.
    pub api_token: Option<String>,

    /// Path of the local SQLite store. Defaults to `categories.db` next to the config file.
    pub database_path: Option<String>,

    /// Per-request timeout for the REST API.
    pub request_timeout_secs: u64,

    /// Quiet period after the last search keystroke before a re-fetch is issued.
    pub search_debounce_ms: u64,

    /// Re-fetch after every mutation settles, reconciling optimistic state.
    pub refresh_after_mutation: bool,

    /// Pass the search term to the store's `list` call. When off the store
    /// returns every record and only the local filter applies, which keeps
    /// ancestors of matches visible.
    pub forward_search: bool,

    pub default_sort: SortKey,
    pub default_order: SortOrder,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            database_path: None,
            request_timeout_secs: 20,
            search_debounce_ms: 300,
            refresh_after_mutation: true,
            forward_search: false,
            default_sort: SortKey::Name,
            default_order: SortOrder::Asc,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_path", &self.database_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("search_debounce_ms", &self.search_debounce_ms)
            .field("refresh_after_mutation", &self.refresh_after_mutation)
            .field("forward_search", &self.forward_search)
            .field("default_sort", &self.default_sort)
            .field("default_order", &self.default_order)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "api_url",
        "api_token",
        "database_path",
        "request_timeout_secs",
        "search_debounce_ms",
        "refresh_after_mutation",
        "forward_search",
        "default_sort",
        "default_order",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            path = %path.display(),
            remote = config.api_url.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Token from the environment, falling back to the file.
    pub fn resolved_api_token(&self) -> Option<String> {
        std::env::var(API_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.api_token.clone())
    }

    /// Request timeout, never below one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
