use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::thumbnail::ThumbnailStrategy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding one cache file per feed URL
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Feed URLs, in merge priority order
    #[serde(default)]
    pub feeds: Vec<String>,
    /// Maximum number of dated items kept from each feed
    #[serde(default = "default_items_per_feed")]
    pub items_per_feed: usize,
    /// Seconds a cached feed stays fresh before it is refetched
    #[serde(default = "default_cache_time")]
    pub cache_time_secs: u64,
    /// Number of feeds processed at once (1 = sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            items_per_feed: default_items_per_feed(),
            cache_time_secs: default_cache_time(),
            concurrency: default_concurrency(),
        }
    }
}

/// Outbound identification sent as the User-Agent header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IdentityConfig {
    /// Always send the same string
    Fixed { user_agent: String },
    /// Pick a random entry from `fetch.user_agents` on every request
    #[default]
    Rotate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Pool used when identity mode is "rotate"
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// HTTP proxy URL (e.g., "http://127.0.0.1:7890" or "socks5://127.0.0.1:1080")
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            user_agents: default_user_agents(),
            request_timeout_secs: default_timeout(),
            proxy_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Resolution steps, tried in order until one yields a URL
    #[serde(default = "default_strategies")]
    pub strategies: Vec<ThumbnailStrategy>,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedmerge")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_items_per_feed() -> usize {
    5
}

fn default_cache_time() -> u64 {
    7200 // 2 hours
}

fn default_concurrency() -> usize {
    1
}

fn default_timeout() -> u64 {
    30
}

fn default_strategies() -> Vec<ThumbnailStrategy> {
    ThumbnailStrategy::ALL.to_vec()
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (iPad; U; CPU OS 3_2 like Mac OS X; en-us) AppleWebKit/531.21.10 (KHTML, like Gecko) Version/4.0.4 Mobile/7B334b Safari/531.21.102011-10-16 20:23:10",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/105.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 12_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/105.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/105.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Linux; Android 10; SM-A205U) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/105.0.5195.136 Mobile Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:105.0) Gecko/20100101 Firefox/105.0",
        "Mozilla/5.0 (X11; Linux i686; rv:105.0) Gecko/20100101 Firefox/105.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 12.6; rv:105.0) Gecko/20100101 Firefox/105.0",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 12_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) FxiOS/105.0 Mobile/15E148 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/105.0.0.0 Safari/537.36 Edg/105.0.1343.50",
    ]
    .iter()
    .map(|ua| ua.to_string())
    .collect()
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from the default location or return defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults if it is missing
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                crate::Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Get the configuration file path
    /// Always uses ~/.config/feedmerge/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("feedmerge")
            .join("config.toml")
    }

    /// Get the cache directory (with tilde expansion)
    pub fn cache_dir(&self) -> PathBuf {
        expand_tilde(&self.general.cache_dir)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.aggregator.cache_time_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.request_timeout_secs)
    }

    /// Check settings that would make every run fail.
    ///
    /// Cache directory writability is checked separately when the cache is opened.
    pub fn validate(&self) -> crate::Result<()> {
        for feed in &self.aggregator.feeds {
            url::Url::parse(feed)
                .map_err(|e| crate::Error::Config(format!("Invalid feed URL '{}': {}", feed, e)))?;
        }

        if self.aggregator.concurrency == 0 {
            return Err(crate::Error::Config(
                "aggregator.concurrency must be at least 1".to_string(),
            ));
        }

        match &self.fetch.identity {
            IdentityConfig::Fixed { user_agent } if user_agent.trim().is_empty() => {
                return Err(crate::Error::Config(
                    "fetch.identity.user_agent must not be empty".to_string(),
                ));
            }
            IdentityConfig::Rotate if self.fetch.user_agents.is_empty() => {
                return Err(crate::Error::Config(
                    "fetch.user_agents must not be empty when identity mode is rotate".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }
}
