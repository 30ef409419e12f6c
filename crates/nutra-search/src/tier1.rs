//! Tier 1: in-process LRU cache.
//!
//! Purely per-process and volatile. Entries are stamped at write time
//! and expired lazily on read, so no sweeper task is needed.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use nutra_core::{defaults, CacheStore, CacheTier, CachedLookup, Result};

struct CachedEntry {
    value: CachedLookup,
    written_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        self.written_at.elapsed() >= self.ttl
    }
}

/// Capacity-bounded in-process cache tier.
#[derive(Clone)]
pub struct LocalCache {
    entries: Arc<Mutex<LruCache<String, CachedEntry>>>,
}

impl LocalCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(defaults::TIER1_CAPACITY)
    }

    /// Create a cache bounded to `capacity` entries (clamped to at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Number of live entries (expired entries count until read).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for LocalCache {
    async fn get(&self, key: &str) -> Result<Option<CachedLookup>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.pop(key);
                debug!(cache_key = key, "tier1 entry expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &CachedLookup, ttl: Duration) -> Result<()> {
        let entry = CachedEntry {
            value: value.clone(),
            written_at: Instant::now(),
            ttl,
        };
        self.entries.lock().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.pop(key);
        Ok(())
    }

    fn tier(&self) -> CacheTier {
        CacheTier::Tier1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker() -> CachedLookup {
        CachedLookup::NotFound
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = LocalCache::new();
        cache
            .set("k1", &marker(), Duration::from_secs(60))
            .await
            .unwrap();

        let got = cache.get("k1").await.unwrap();
        assert!(matches!(got, Some(CachedLookup::NotFound)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = LocalCache::new();
        assert!(cache.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_on_read() {
        let cache = LocalCache::new();
        cache.set("k1", &marker(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.len().await, 1);

        assert!(cache.get("k1").await.unwrap().is_none());
        assert_eq!(cache.len().await, 0, "expired entry should be dropped");
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = LocalCache::with_capacity(2);
        let ttl = Duration::from_secs(60);
        cache.set("a", &marker(), ttl).await.unwrap();
        cache.set("b", &marker(), ttl).await.unwrap();

        // Touch "a" so "b" is the eviction candidate
        cache.get("a").await.unwrap();
        cache.set("c", &marker(), ttl).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_some());
        assert!(cache.get("b").await.unwrap().is_none());
        assert!(cache.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = LocalCache::new();
        cache
            .set("k1", &marker(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("k1").await.unwrap();
        assert!(cache.get("k1").await.unwrap().is_none());

        // Deleting an absent key is a no-op
        cache.delete("k1").await.unwrap();
    }

    #[tokio::test]
    async fn clear_empties_cache() {
        let cache = LocalCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("a", &marker(), ttl).await.unwrap();
        cache.set("b", &marker(), ttl).await.unwrap();

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        // Construction must not panic
        let _ = LocalCache::with_capacity(0);
    }

    #[test]
    fn reports_tier1() {
        assert_eq!(LocalCache::new().tier(), CacheTier::Tier1);
    }
}
