//! Runtime configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) is a
//! valid configuration. A handful of environment variables override the
//! file after loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

// ============================================================================
// Default Values
// ============================================================================

/// Cached responses live this long
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Maximum cached responses
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;

/// Admissions per caller per window
pub const DEFAULT_RATE_LIMIT: u32 = 60;

pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;

/// Upper bound on tracked caller identities
pub const DEFAULT_MAX_IDENTITIES: usize = 10_000;

/// Per-source fetch timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Connection-test timeout in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

pub const ENV_OFFLINE: &str = "MOCK_MODE";
pub const ENV_CACHE_TTL: &str = "CACHE_TTL";
pub const ENV_RATE_LIMIT: &str = "RATE_LIMIT_PER_MINUTE";

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Serve fixed payloads instead of calling providers
    pub offline: bool,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub sources: SourcesConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_window: u32,
    pub window_secs: u64,
    pub max_identities: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_window: DEFAULT_RATE_LIMIT,
            window_secs: DEFAULT_RATE_WINDOW_SECS,
            max_identities: DEFAULT_MAX_IDENTITIES,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub news: NewsConfig,
    pub video: VideoConfig,
    pub social: SocialConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            news: NewsConfig::default(),
            video: VideoConfig::default(),
            social: SocialConfig::default(),
        }
    }
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    pub lang: String,
    pub country: String,
    /// Provider-side page size ceiling
    pub page_size: u32,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gnews.io/api/v4".to_string(),
            lang: "it".to_string(),
            country: "it".to_string(),
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub base_url: String,
    pub relevance_language: String,
    pub page_size: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            relevance_language: "it".to_string(),
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub auth_url: String,
    pub base_url: String,
    pub user_agent: String,
    /// Communities searched for every query
    pub communities: Vec<String>,
    pub per_community_limit: u32,
    /// Cap on the concatenated items across communities
    pub max_items: usize,
    pub sort: String,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://www.reddit.com/api/v1/access_token".to_string(),
            base_url: "https://oauth.reddit.com".to_string(),
            user_agent: concat!("feedmerge/", env!("CARGO_PKG_VERSION")).to_string(),
            communities: ["programming", "MachineLearning", "cybersecurity", "webdev", "datascience"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            per_community_limit: 10,
            max_items: 20,
            sort: "relevance".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// Defaults to `<data dir>/feedmerge/results.json`
    pub path: Option<PathBuf>,
    pub queue_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AggregatorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` when given, defaults otherwise, then apply
    /// environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `MOCK_MODE`, `CACHE_TTL` and `RATE_LIMIT_PER_MINUTE` overrides.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_OFFLINE) {
            self.offline = parse_bool(ENV_OFFLINE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CACHE_TTL) {
            self.cache.ttl_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_CACHE_TTL,
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup(ENV_RATE_LIMIT) {
            self.rate_limit.per_window = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_RATE_LIMIT,
                value: raw.clone(),
            })?;
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key,
            value: raw.to_string(),
        }),
    }
}
