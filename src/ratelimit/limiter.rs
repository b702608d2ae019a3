//! Core rate limiter implementation.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::cache::{default_cache, Cache};
use crate::config::LimiterConfig;
use crate::error::{LimiterError, Result};

use super::key::{ModuleKey, DEFAULT_KEY_PREFIX, DEFAULT_SEPARATOR};
use super::rule::{Rule, RuleSpec, RuleValue};

/// Counts operations per (module, identity) pair and refuses them once the
/// rule's budget is used up.
///
/// Counters live in the injected [`Cache`]. Each successful recording
/// rewrites the counter with a time-to-live of the rule's window, so the
/// window restarts on every write and a counter disappears once its
/// identity has been idle for the whole window.
///
/// Recording is a read, a check and a write with no lock in between. Two
/// callers recording the same key at the same time can both read the same
/// count and both succeed, so the stored count may end up lower than the
/// number of accepted operations.
pub struct RateLimiter {
    rule: Rule,
    key_prefix: String,
    separator: char,
    cache: Arc<dyn Cache>,
    /// Key derived by the last `set_module` call
    module: ModuleKey,
    /// Count observed by the last read or write
    record_count: u64,
}

impl RateLimiter {
    /// Create a limiter.
    ///
    /// Invalid rule values and an empty prefix fall back to the defaults.
    /// Without a cache the limiter uses the process-wide
    /// [`default_cache`].
    pub fn new(rule: &RuleSpec, key_prefix: &str, cache: Option<Arc<dyn Cache>>) -> Self {
        let mut limiter = Self {
            rule: Rule::default(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            separator: DEFAULT_SEPARATOR,
            cache: cache.unwrap_or_else(default_cache),
            module: ModuleKey::default(),
            record_count: 0,
        };
        limiter.set_rule(rule).set_key_prefix(key_prefix);
        limiter
    }

    /// Create a limiter with the default rule and prefix on `cache`.
    pub fn with_cache(cache: Arc<dyn Cache>) -> Self {
        Self::new(&RuleSpec::default(), "", Some(cache))
    }

    /// Create a limiter from configuration.
    ///
    /// Only the rule, prefix and separator are taken from `config`. The
    /// `memory_cache` section describes a cache the caller builds with
    /// [`MemoryCache::from_config`](crate::cache::MemoryCache::from_config).
    pub fn from_config(config: &LimiterConfig, cache: Option<Arc<dyn Cache>>) -> Self {
        let mut limiter = Self::new(&config.rule, &config.key_prefix, cache);
        limiter.set_separator(config.separator);
        limiter
    }

    /// Apply a rule update. Fields that are missing or not non-negative
    /// integers keep their current value.
    pub fn set_rule(&mut self, spec: &RuleSpec) -> &mut Self {
        self.rule.apply(spec);
        trace!(
            max_count = self.rule.max_count,
            max_seconds = self.rule.max_seconds,
            "Rule updated"
        );
        self
    }

    /// Set the maximum count, ignoring invalid values.
    pub fn set_max_count(&mut self, value: impl Into<RuleValue>) -> &mut Self {
        self.rule.set_max_count(value);
        self
    }

    /// Set the window length in seconds, ignoring invalid values.
    pub fn set_max_seconds(&mut self, value: impl Into<RuleValue>) -> &mut Self {
        self.rule.set_max_seconds(value);
        self
    }

    /// Replace the key prefix. An empty prefix is ignored.
    pub fn set_key_prefix(&mut self, prefix: &str) -> &mut Self {
        if !prefix.is_empty() {
            self.key_prefix = prefix.to_string();
        }
        self
    }

    /// Replace the separator placed between key segments.
    pub fn set_separator(&mut self, separator: char) -> &mut Self {
        self.separator = separator;
        self
    }

    /// Replace the cache holding the counters.
    pub fn set_cache(&mut self, cache: Arc<dyn Cache>) -> &mut Self {
        self.cache = cache;
        self
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    pub fn max_count(&self) -> u64 {
        self.rule.max_count
    }

    pub fn max_seconds(&self) -> u64 {
        self.rule.max_seconds
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Select the module and identity that later calls operate on.
    pub fn set_module(&mut self, module: &str, identity: &str) -> &mut Self {
        self.module = ModuleKey::new(&self.key_prefix, self.separator, module, identity);
        trace!(key = %self.module, "Selected module");
        self
    }

    /// The key derived by the last [`set_module`](Self::set_module) call.
    pub fn module(&self) -> &str {
        self.module.as_str()
    }

    /// The identity given to the last [`set_module`](Self::set_module) call.
    pub fn identity(&self) -> &str {
        self.module.identity()
    }

    /// The count seen by the last read or write, without touching the cache.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Read the current count for the selected key from the cache.
    ///
    /// A missing counter counts as zero. A failed read is logged and also
    /// counts as zero.
    pub async fn get_record_count(&mut self) -> u64 {
        let count = match self.cache.get(self.module.as_str()).await {
            Ok(value) => value.unwrap_or(0),
            Err(error) => {
                warn!(key = %self.module, error = %error, "Failed to read counter");
                0
            }
        };

        trace!(key = %self.module, count = count, "Read counter");
        self.record_count = count;
        count
    }

    /// Whether the selected key may record another operation.
    pub async fn check(&mut self) -> bool {
        let count = self.get_record_count().await;
        self.rule.allows(count)
    }

    /// Record one operation for `identity` in `module`.
    ///
    /// Returns the new count, or an error telling whether the rule denied
    /// the operation or the cache failed to store it.
    pub async fn add_module_record(&mut self, module: &str, identity: &str) -> Result<u64> {
        self.set_module(module, identity);

        if !self.check().await {
            debug!(
                key = %self.module,
                count = self.record_count,
                max_count = self.rule.max_count,
                "Rate limit exceeded"
            );
            return Err(LimiterError::RateLimitExceeded {
                key: self.module.to_string(),
                count: self.record_count,
                max_count: self.rule.max_count,
            });
        }

        let count = self.get_record_count().await.saturating_add(1);
        if let Err(error) = self
            .cache
            .set(self.module.as_str(), count, self.rule.max_seconds)
            .await
        {
            warn!(key = %self.module, error = %error, "Failed to write counter");
            return Err(LimiterError::CacheWrite(error));
        }

        debug!(
            key = %self.module,
            count = count,
            ttl = self.rule.max_seconds,
            "Recorded operation"
        );
        self.record_count = count;
        Ok(count)
    }

    /// Like [`add_module_record`](Self::add_module_record), collapsing both
    /// failure kinds into `None`.
    pub async fn try_add_module_record(&mut self, module: &str, identity: &str) -> Option<u64> {
        self.add_module_record(module, identity).await.ok()
    }

    /// Delete the counter for `identity` in `module`.
    pub async fn remove_module_record(&mut self, module: &str, identity: &str) -> Result<()> {
        self.set_module(module, identity);

        self.cache
            .delete(self.module.as_str())
            .await
            .map_err(|error| {
                warn!(key = %self.module, error = %error, "Failed to remove counter");
                LimiterError::CacheDelete(error)
            })?;

        debug!(key = %self.module, "Removed counter");
        Ok(())
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rule", &self.rule)
            .field("key_prefix", &self.key_prefix)
            .field("separator", &self.separator)
            .field("module", &self.module.as_str())
            .field("record_count", &self.record_count)
            .finish_non_exhaustive()
    }
}
