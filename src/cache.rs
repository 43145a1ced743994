// Process-wide page cache: LRU of rendered response bodies with per-entry
// TTL, keyed by request URL (path + query).

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

#[derive(Clone)]
pub struct PageCache {
    inner: Arc<Mutex<LruCache<String, CacheEntry>>>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        PageCache {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut cache = self.inner.lock().await;
        match cache.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.body.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: String, body: String) {
        let entry = CacheEntry {
            body,
            inserted_at: Instant::now(),
            ttl: self.ttl,
        };
        self.inner.lock().await.put(key, entry);
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}
