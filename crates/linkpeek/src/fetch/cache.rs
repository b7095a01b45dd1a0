//! In-memory response cache behind the cache-preferring fetch policy.
//!
//! ## Eviction
//!
//! When the cache is full, the entry inserted longest ago is evicted.
//! A capacity of zero disables caching entirely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

/// Default number of cached response bodies.
pub const DEFAULT_CAPACITY: usize = 256;

struct CacheEntry {
    body: Arc<[u8]>,
    inserted_at: Instant,
}

/// Successful response bodies keyed by request URL.
///
/// Shared between fetchers through an `Arc`; owned by whoever builds the
/// resolver, not by any process-wide state.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, url: &str) -> Option<Arc<[u8]>> {
        let entries = self.entries.read().await;
        entries.get(url).map(|e| Arc::clone(&e.body))
    }

    pub async fn insert(&self, url: &str, body: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().await;
        if !entries.contains_key(url) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                tracing::debug!("evicting cached response: {key}");
                entries.remove(&key);
            }
        }
        entries.insert(
            url.to_string(),
            CacheEntry {
                body: Arc::from(body),
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn remove(&self, url: &str) -> bool {
        self.entries.write().await.remove(url).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = ResponseCache::new(4);
        assert!(cache.get("https://a").await.is_none());
        cache.insert("https://a", b"body").await;
        assert_eq!(cache.get("https://a").await.as_deref(), Some(&b"body"[..]));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_evicts_oldest_when_full() {
        let cache = ResponseCache::new(2);
        cache.insert("https://a", b"a").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        cache.insert("https://b", b"b").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        cache.insert("https://c", b"c").await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("https://a").await.is_none());
        assert!(cache.get("https://b").await.is_some());
        assert!(cache.get("https://c").await.is_some());
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = ResponseCache::new(2);
        cache.insert("https://a", b"a").await;
        cache.insert("https://b", b"b").await;
        cache.insert("https://b", b"b2").await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("https://b").await.as_deref(), Some(&b"b2"[..]));
    }

    #[tokio::test]
    async fn test_disabled_cache_stores_nothing() {
        let cache = ResponseCache::disabled();
        cache.insert("https://a", b"a").await;
        assert!(cache.is_empty().await);
    }
}
