//! Counter storage with expiry.
//!
//! The limiter never expires anything itself; it hands every counter to a
//! [`Cache`] together with a time-to-live and trusts the store to forget it.

mod clock;
mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::CacheResult;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

/// Key-value store with per-entry expiry that backs the limiter's counters.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch the value stored under `key`. A missing or expired key is `Ok(None)`.
    async fn get(&self, key: &str) -> CacheResult<Option<u64>>;

    /// Store `value` under `key`, replacing any previous value and restarting
    /// its expiry. A `ttl_seconds` of zero means the value never expires.
    async fn set(&self, key: &str, value: u64, ttl_seconds: u64) -> CacheResult<()>;

    /// Remove `key`. Removing a key that does not exist succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}

static DEFAULT_CACHE: RwLock<Option<Arc<dyn Cache>>> = parking_lot::const_rwlock(None);

/// Install the process-wide cache used by limiters built without one.
///
/// Intended to be called once during startup. A later call replaces the
/// instance for limiters constructed afterwards; existing limiters keep the
/// handle they were given.
pub fn install_default(cache: Arc<dyn Cache>) {
    *DEFAULT_CACHE.write() = Some(cache);
}

/// The process-wide cache, created as an unbounded [`MemoryCache`] on first
/// use if none was installed.
pub fn default_cache() -> Arc<dyn Cache> {
    if let Some(cache) = DEFAULT_CACHE.read().as_ref() {
        return Arc::clone(cache);
    }

    let mut slot = DEFAULT_CACHE.write();
    let cache = slot.get_or_insert_with(|| {
        tracing::debug!("No default cache installed, creating in-memory cache");
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        cache
    });
    Arc::clone(cache)
}
