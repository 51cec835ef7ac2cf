//! Configuration file parser for ~/.config/colino/config.yaml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML in config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Rotating-proxy credentials for YouTube transcript traffic (spec.md §4.1,
/// §4.5). When `enabled`, the transcript fetcher routes through
/// `http://{username}-rotate:{password}@{domain}:{port}/` and disables
/// HTTP keep-alives so each request can rotate egress address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YoutubeProxyConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
    pub domain: String,
    pub port: u16,
}

impl Default for YoutubeProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: String::new(),
            password: String::new(),
            domain: "p.webshare.io".to_string(),
            port: 80,
        }
    }
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered list of feed URLs to ingest.
    pub feeds: Vec<String>,

    /// Per-HTTP-request timeout for feed and article fetches, in seconds.
    pub timeout_seconds: u64,

    /// Upper bound on entries queued from one feed per run.
    pub max_posts_per_feed: usize,

    /// Hint used to pick the per-host politeness interval (spec.md §4.6).
    pub scraper_max_workers: usize,

    pub youtube_proxy: YoutubeProxyConfig,

    /// Cache file location. `None` means "use the platform default".
    pub database_path: Option<String>,

    /// Explicit log file path. `None` means stdout unless `$COLINO_LOG` is set.
    pub log_path: Option<PathBuf>,

    /// Sent as the `User-Agent` header on every outbound HTTP request.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            timeout_seconds: 30,
            max_posts_per_feed: 100,
            scraper_max_workers: 5,
            youtube_proxy: YoutubeProxyConfig::default(),
            database_path: None,
            log_path: None,
            user_agent: "colino/0.1".to_string(),
        }
    }
}

/// Masks nothing secret today (no API keys in this config), but kept as a
/// custom impl so the youtube proxy password never accidentally lands in
/// logs through a derived Debug.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("feeds", &self.feeds)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_posts_per_feed", &self.max_posts_per_feed)
            .field("scraper_max_workers", &self.scraper_max_workers)
            .field("youtube_proxy_enabled", &self.youtube_proxy.enabled)
            .field("database_path", &self.database_path)
            .field("log_path", &self.log_path)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a YAML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid YAML → `Err(ConfigError::Parse)`
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion from a
        // maliciously large or corrupted config file.
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

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = serde_yaml::from_str::<serde_yaml::Mapping>(&content) {
            let known_keys = [
                "feeds",
                "timeout_seconds",
                "max_posts_per_feed",
                "scraper_max_workers",
                "youtube_proxy",
                "database_path",
                "log_path",
                "user_agent",
            ];
            for key in raw.keys() {
                if let Some(key) = key.as_str() {
                    if !known_keys.contains(&key) {
                        tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                    }
                }
            }
        }

        let config: Config = serde_yaml::from_str(&content)?;
        tracing::info!(path = %path.display(), feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }

    /// Load configuration, degrading to defaults on any error. This is the
    /// entry point `main.rs` uses — a malformed document is never fatal.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve `~/.config/colino/config.yaml` (or the platform equivalent).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("colino")
            .join("config.yaml")
    }

    /// Resolve the effective database path: config override, else the
    /// platform default.
    pub fn resolve_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return expand_path(path);
        }

        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("colino").join("colino.db");
        }

        PathBuf::from("./colino.db")
    }
}

/// Expands a leading `~` and `$VAR` references in a path string.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut expanded = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '~' && expanded.is_empty() {
            if let Some(home) = dirs::home_dir() {
                expanded.push_str(&home.to_string_lossy());
            } else {
                expanded.push('~');
            }
        } else if c == '$' {
            let mut var_name = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_alphanumeric() || next == '_' {
                    var_name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                expanded.push('$');
            } else if let Ok(value) = std::env::var(&var_name) {
                expanded.push_str(&value);
            }
        } else {
            expanded.push(c);
        }
    }

    PathBuf::from(expanded)
}

// ============================================================================
// Tests
// ============================================================================
