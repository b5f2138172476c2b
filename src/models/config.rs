//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and scraping behavior settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Watch loop settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Persistence backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Line-oriented status output
    #[serde(default)]
    pub output: OutputConfig,

    /// Optional Slack sink
    #[serde(default)]
    pub slack: SlackConfig,

    /// Remote batch retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::config("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::config("fetcher.timeout_secs must be > 0"));
        }
        if self.watch.period_secs == 0 {
            return Err(AppError::config("watch.period_secs must be > 0"));
        }
        if self.store.uri.trim().is_empty() {
            return Err(AppError::config("store.uri is empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::config("retry.max_attempts must be > 0"));
        }
        self.slack.validate()
    }
}

/// HTTP client and scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Root of the evcharge.online site
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Latitude sent with site searches
    #[serde(default = "defaults::search_latitude")]
    pub search_latitude: String,

    /// Longitude sent with site searches
    #[serde(default = "defaults::search_longitude")]
    pub search_longitude: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            search_latitude: defaults::search_latitude(),
            search_longitude: defaults::search_longitude(),
        }
    }
}

/// Watch loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Keep running and report changes
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between ticks
    #[serde(default = "defaults::period")]
    pub period_secs: u64,

    /// Skip the start-up state report
    #[serde(default)]
    pub quiet: bool,
}

impl WatchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_secs: defaults::period(),
            quiet: false,
        }
    }
}

/// Persistence backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `path/to/file.json`, `file://...` or `dynamodb://table`
    #[serde(default = "defaults::store_uri")]
    pub uri: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: defaults::store_uri(),
        }
    }
}

/// Status output destination.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// File to append to; stdout when unset or `-`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Slack sink settings. Either `hook_url` or `token` enables the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub hook_url: Option<String>,

    /// Bot or user token
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub channel_id: Option<String>,

    #[serde(default)]
    pub icon_emoji: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    /// Endpoint used in token mode
    #[serde(default = "defaults::slack_api_url")]
    pub api_url: String,
}

impl SlackConfig {
    /// Whether a Slack sink should be built.
    pub fn is_enabled(&self) -> bool {
        self.hook_url.is_some() || self.token.is_some()
    }

    /// Reject combinations that only make sense for one auth mode.
    pub fn validate(&self) -> Result<()> {
        if self.hook_url.is_some() && self.token.is_some() {
            return Err(AppError::config(
                "slack.hook_url cannot be combined with slack.token",
            ));
        }
        if self.hook_url.is_some() {
            for (name, value) in [
                ("channel_id", &self.channel_id),
                ("icon_emoji", &self.icon_emoji),
                ("username", &self.username),
            ] {
                if value.is_some() {
                    return Err(AppError::config(format!(
                        "slack.{name} cannot be specified with slack.hook_url"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            hook_url: None,
            token: None,
            channel_id: None,
            icon_emoji: None,
            username: None,
            api_url: defaults::slack_api_url(),
        }
    }
}

/// Retry policy for partially processed remote batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total submissions allowed per batch, including the first
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay(),
            max_delay_ms: defaults::max_delay(),
        }
    }
}

mod defaults {
    // Fetcher defaults
    pub fn base_url() -> String {
        "https://evcharge.online/".into()
    }
    pub fn user_agent() -> String {
        "evcharge.online status monitor / https://github.com/mitchellrj/evcharge-online-status"
            .into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn search_latitude() -> String {
        "52.06290".into()
    }
    pub fn search_longitude() -> String {
        "-1.33978".into()
    }

    // Watch defaults
    pub fn period() -> u64 {
        300
    }

    // Store defaults
    pub fn store_uri() -> String {
        "site.json".into()
    }

    // Slack defaults
    pub fn slack_api_url() -> String {
        "https://slack.com/api/chat.postMessage".into()
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        8
    }
    pub fn base_delay() -> u64 {
        50
    }
    pub fn max_delay() -> u64 {
        5_000
    }
}
