//! Named caches used by the security layer.
//!
//! The realm caches authorization info per principal through these traits.
//! `MemoryCacheManager` keeps entries in a per-instance `DashMap`; the Redis
//! implementation lives in `daijie-auth-redis`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// Default entry lifetime for cached security data.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(1800);

/// A named key/value cache with byte values.
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Option<Arc<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>);

    async fn remove(&self, key: &str);
}

/// Hands out named caches.
pub trait CacheManager: Send + Sync {
    fn get_cache(&self, name: &str) -> Arc<dyn Cache>;

    /// Short label for health output (`"local"`, `"redis"`).
    fn mode(&self) -> &'static str;
}

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Single-instance cache manager backed by `DashMap`.
#[derive(Clone)]
pub struct MemoryCacheManager {
    entries: Arc<DashMap<String, CachedEntry>>,
    ttl: Duration,
}

impl MemoryCacheManager {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Number of entries across all named caches (expired ones included).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager for MemoryCacheManager {
    fn get_cache(&self, name: &str) -> Arc<dyn Cache> {
        Arc::new(MemoryCache {
            name: name.to_string(),
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
        })
    }

    fn mode(&self) -> &'static str {
        "local"
    }
}

struct MemoryCache {
    name: String,
    entries: Arc<DashMap<String, CachedEntry>>,
    ttl: Duration,
}

impl MemoryCache {
    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.name, key)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let full_key = self.full_key(key);
        let entry = self.entries.get(&full_key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(&full_key);
            return None;
        }
        Some(Arc::clone(&entry.data))
    }

    async fn put(&self, key: &str, value: Vec<u8>) {
        self.entries
            .insert(self.full_key(key), CachedEntry::new(value, self.ttl));
    }

    async fn remove(&self, key: &str) {
        self.entries.remove(&self.full_key(key));
        tracing::debug!(cache = %self.name, key = %key, "cache entry removed (local)");
    }
}
