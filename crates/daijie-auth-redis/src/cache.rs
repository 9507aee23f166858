//! Two-tier cache manager: L1 (DashMap) + L2 (Redis).
//!
//! ## Lookup Order
//!
//! 1. L1 (this instance's DashMap)
//! 2. L2 (Redis), promoting hits into L1
//!
//! Writes and removals update L1 immediately and reach Redis through a
//! single background writer per manager, so L2 applies them in call order.
//! Removals also publish the key on [`INVALIDATION_CHANNEL`] so other
//! instances drop their L1 copy (see [`crate::pubsub`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daijie_auth::cache::{Cache, CacheManager, CachedEntry, DEFAULT_CACHE_TTL};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::client::RedisManager;

pub const CACHE_KEY_PREFIX: &str = "shiro_redis_cache:";
pub const INVALIDATION_CHANNEL: &str = "shiro_redis_cache:invalidate";

/// Full Redis key for `key` in the cache called `name`.
pub fn cache_key(name: &str, key: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{name}:{key}")
}

/// L2 operations, applied one at a time by [`run_writer`].
enum L2Write {
    Set {
        key: String,
        data: Arc<Vec<u8>>,
        ttl: Duration,
    },
    Remove {
        key: String,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct RedisCacheManager {
    redis: RedisManager,
    local: Arc<DashMap<String, CachedEntry>>,
    writes: mpsc::UnboundedSender<L2Write>,
    ttl: Duration,
}

impl RedisCacheManager {
    /// Must be called inside a Tokio runtime; the L2 writer is spawned here.
    pub fn new(redis: RedisManager) -> Self {
        Self::with_ttl(redis, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(redis: RedisManager, ttl: Duration) -> Self {
        let (writes, queue) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(redis.clone(), queue));
        Self {
            redis,
            local: Arc::new(DashMap::new()),
            writes,
            ttl,
        }
    }

    /// The L1 map, shared by every named cache of this manager.
    pub fn local_cache(&self) -> &Arc<DashMap<String, CachedEntry>> {
        &self.local
    }

    pub fn redis(&self) -> &RedisManager {
        &self.redis
    }

    /// Wait until every L2 write queued so far has been applied.
    pub async fn flush(&self) {
        let (done, applied) = oneshot::channel();
        if self.writes.send(L2Write::Flush(done)).is_ok() {
            let _ = applied.await;
        }
    }
}

/// Applies queued L2 writes in order. Ends when every sender is dropped.
async fn run_writer(redis: RedisManager, mut queue: mpsc::UnboundedReceiver<L2Write>) {
    while let Some(write) = queue.recv().await {
        match write {
            L2Write::Set { key, data, ttl } => match redis.set_ex(&key, &data, ttl).await {
                Ok(()) => tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set (L1+L2)"),
                Err(e) => tracing::warn!(key = %key, error = %e, "Redis SET error"),
            },
            L2Write::Remove { key } => {
                if let Err(e) = redis.del(&key).await {
                    tracing::warn!(key = %key, error = %e, "Redis DEL error");
                }
                match redis.publish(INVALIDATION_CHANNEL, &key).await {
                    Ok(()) => tracing::debug!(key = %key, "cache invalidated (L1+L2+pub/sub)"),
                    Err(e) => tracing::warn!(key = %key, error = %e, "Redis PUBLISH error"),
                }
            }
            L2Write::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl CacheManager for RedisCacheManager {
    fn get_cache(&self, name: &str) -> Arc<dyn Cache> {
        Arc::new(RedisCache {
            name: name.to_string(),
            redis: self.redis.clone(),
            local: Arc::clone(&self.local),
            writes: self.writes.clone(),
            ttl: self.ttl,
        })
    }

    fn mode(&self) -> &'static str {
        "redis"
    }
}

struct RedisCache {
    name: String,
    redis: RedisManager,
    local: Arc<DashMap<String, CachedEntry>>,
    writes: mpsc::UnboundedSender<L2Write>,
    ttl: Duration,
}

impl RedisCache {
    fn queue(&self, write: L2Write) {
        if self.writes.send(write).is_err() {
            tracing::warn!(cache = %self.name, "Redis writer stopped; L2 update dropped");
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let full_key = cache_key(&self.name, key);

        if let Some(entry) = self.local.get(&full_key) {
            if !entry.is_expired() {
                tracing::debug!(key = %full_key, "cache hit (L1)");
                return Some(Arc::clone(&entry.data));
            }
            drop(entry);
            self.local.remove(&full_key);
        }

        match self.redis.get(&full_key).await {
            Ok(Some(data)) => {
                tracing::debug!(key = %full_key, "cache hit (L2)");
                let entry = CachedEntry::new(data, self.ttl);
                let data = Arc::clone(&entry.data);
                self.local.insert(full_key, entry);
                Some(data)
            }
            Ok(None) => {
                tracing::debug!(key = %full_key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "Redis GET error");
                None
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) {
        let full_key = cache_key(&self.name, key);
        let entry = CachedEntry::new(value, self.ttl);
        let data = Arc::clone(&entry.data);
        self.local.insert(full_key.clone(), entry);

        self.queue(L2Write::Set {
            key: full_key,
            data,
            ttl: self.ttl,
        });
    }

    async fn remove(&self, key: &str) {
        let full_key = cache_key(&self.name, key);
        self.local.remove(&full_key);

        self.queue(L2Write::Remove { key: full_key });
    }
}
