//! Configuration management for limiters.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{LimiterError, Result};
use crate::ratelimit::{RuleSpec, DEFAULT_KEY_PREFIX, DEFAULT_SEPARATOR};

/// Configuration for a single limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Rule overrides; missing or invalid fields fall back to the defaults
    #[serde(default)]
    pub rule: RuleSpec,

    /// Prefix for every cache key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Separator between key segments
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Settings for an in-memory cache built with
    /// [`MemoryCache::from_config`](crate::cache::MemoryCache::from_config).
    ///
    /// [`RateLimiter::from_config`](crate::RateLimiter::from_config) does not
    /// read this section; the host builds the cache and passes it in or
    /// installs it with [`install_default`](crate::cache::install_default).
    #[serde(default)]
    pub memory_cache: MemoryCacheConfig,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rule: RuleSpec::default(),
            key_prefix: default_key_prefix(),
            separator: default_separator(),
            memory_cache: MemoryCacheConfig::default(),
        }
    }
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_separator() -> char {
    DEFAULT_SEPARATOR
}

/// In-memory cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Maximum number of counters held at once (unbounded if unset)
    #[serde(default)]
    pub capacity: Option<usize>,

    /// Interval in seconds between expired-entry sweeps (no sweeper if unset)
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse limiter config: {}", e)))
    }
}
