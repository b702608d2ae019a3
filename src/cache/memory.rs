//! In-process cache with lazy expiry.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock};
use super::Cache;
use crate::config::MemoryCacheConfig;
use crate::error::{CacheError, CacheResult};

/// A stored counter and the moment it stops being visible.
#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    /// `None` for entries stored without a time-to-live
    expires_at: Option<Duration>,
}

impl Entry {
    fn is_expired(&self, now: Duration) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

/// A [`Cache`] kept in process memory.
///
/// Expired entries are dropped when they are next read, by
/// [`purge_expired`](MemoryCache::purge_expired), or by the optional
/// background sweeper.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    /// Maximum number of live keys, if bounded
    capacity: Option<usize>,
    /// Held while a new key is checked against `capacity` and inserted
    insert_lock: Mutex<()>,
}

impl MemoryCache {
    /// Create an unbounded cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create an unbounded cache that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            capacity: None,
            insert_lock: Mutex::new(()),
        }
    }

    /// Build a cache from configuration, starting the sweeper if an
    /// interval is set and a tokio runtime is available.
    pub fn from_config(config: &MemoryCacheConfig) -> Arc<Self> {
        let mut cache = Self::new();
        if let Some(capacity) = config.capacity {
            cache = cache.with_capacity_limit(capacity);
        }
        let cache = Arc::new(cache);

        if let Some(secs) = config.sweep_interval_secs {
            if tokio::runtime::Handle::try_current().is_ok() {
                cache.spawn_sweeper(Duration::from_secs(secs));
            } else {
                warn!("No tokio runtime, expired entries are only purged on access");
            }
        }
        cache
    }

    /// Limit the number of keys the cache will hold.
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// The configured key limit, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!(removed = removed, "Purged expired cache entries");
        }
        removed
    }

    /// Periodically purge expired entries on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let interval = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.purge_expired();
                    }
                    None => break,
                }
            }
            trace!("Cache sweeper stopped");
        })
    }

    /// Must be called with `insert_lock` held.
    fn ensure_room_for(&self, key: &str, capacity: usize) -> CacheResult<()> {
        if self.entries.contains_key(key) || self.entries.len() < capacity {
            return Ok(());
        }

        self.purge_expired();
        if self.entries.len() < capacity {
            Ok(())
        } else {
            Err(CacheError::Full { capacity })
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<u64>> {
        let now = self.clock.now();

        match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value)),
            Some(_) => {}
        }

        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        trace!(key = %key, "Dropped expired cache entry");
        Ok(None)
    }

    async fn set(&self, key: &str, value: u64, ttl_seconds: u64) -> CacheResult<()> {
        let expires_at = match ttl_seconds {
            0 => None,
            secs => self.clock.now().checked_add(Duration::from_secs(secs)),
        };
        let entry = Entry { value, expires_at };

        let Some(capacity) = self.capacity else {
            self.entries.insert(key.to_string(), entry);
            return Ok(());
        };

        // Overwrites never change the number of keys
        if let Some(mut existing) = self.entries.get_mut(key) {
            *existing = entry;
            return Ok(());
        }

        let _guard = self.insert_lock.lock();
        self.ensure_room_for(key, capacity)?;
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    fn manual_cache() -> (Arc<ManualClock>, MemoryCache) {
        let clock = Arc::new(ManualClock::new());
        let cache = MemoryCache::with_clock(clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (_, cache) = manual_cache();
        assert_eq!(cache.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_, cache) = manual_cache();
        cache.set("a", 3, 10).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (clock, cache) = manual_cache();
        cache.set("a", 1, 10).await.unwrap();

        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.get("a").await.unwrap(), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_set_resets_expiry() {
        let (clock, cache) = manual_cache();
        cache.set("a", 1, 10).await.unwrap();

        clock.advance(Duration::from_secs(8));
        cache.set("a", 2, 10).await.unwrap();

        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("a").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let (clock, cache) = manual_cache();
        cache.set("a", 5, 0).await.unwrap();

        clock.advance(Duration::from_secs(86400 * 365));
        assert_eq!(cache.get("a").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_, cache) = manual_cache();
        cache.set("a", 1, 10).await.unwrap();

        cache.delete("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);

        // Deleting again is still a success
        cache.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (clock, cache) = manual_cache();
        cache.set("short", 1, 5).await.unwrap();
        cache.set("long", 1, 50).await.unwrap();
        cache.set("forever", 1, 0).await.unwrap();

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let (clock, cache) = manual_cache();
        let cache = cache.with_capacity_limit(2);

        cache.set("a", 1, 5).await.unwrap();
        cache.set("b", 1, 50).await.unwrap();

        // Overwriting an existing key is always allowed
        cache.set("a", 2, 5).await.unwrap();

        let err = cache.set("c", 1, 5).await.unwrap_err();
        assert_eq!(err, CacheError::Full { capacity: 2 });

        // Once "a" expires there is room again
        clock.advance(Duration::from_secs(5));
        cache.set("c", 1, 5).await.unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = MemoryCacheConfig {
            capacity: Some(1),
            sweep_interval_secs: Some(60),
        };
        let cache = MemoryCache::from_config(&config);
        assert_eq!(cache.capacity(), Some(1));

        cache.set("a", 1, 10).await.unwrap();
        assert!(cache.set("b", 1, 10).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_holds_under_concurrent_inserts() {
        let cache = Arc::new(MemoryCache::new().with_capacity_limit(8));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.set(&format!("key-{i}"), 1, 60).await })
            })
            .collect();

        let mut stored = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => stored += 1,
                Err(err) => assert_eq!(err, CacheError::Full { capacity: 8 }),
            }
        }

        assert_eq!(stored, 8);
        assert_eq!(cache.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_and_stops() {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        cache.set("a", 1, 1).await.unwrap();

        let handle = cache.spawn_sweeper(Duration::from_secs(1));
        clock.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.await.unwrap();
    }
}
