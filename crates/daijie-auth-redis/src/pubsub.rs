//! Redis Pub/Sub for cross-instance cache invalidation.

use std::sync::Arc;
use std::time::Duration;

use daijie_auth::cache::CachedEntry;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::cache::INVALIDATION_CHANNEL;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Evicts keys from the local L1 map when another instance removes them.
///
/// ## Example Flow
///
/// ```text
/// Instance 1: cache.remove("alice")
///   ↓
/// Redis Pub/Sub: PUBLISH shiro_redis_cache:invalidate "shiro_redis_cache:authorizationCache:alice"
///   ↓
/// Instance 2: Listener receives the key → removes it from L1
/// ```
pub struct CacheInvalidationListener {
    /// Candidate nodes, tried in turn after each failure.
    pub redis_urls: Vec<String>,
    pub local_cache: Arc<DashMap<String, CachedEntry>>,
}

impl CacheInvalidationListener {
    /// Spawn the listener. Whenever the subscription fails or closes it moves
    /// on to the next node and retries with exponential backoff (up to five
    /// minutes). The backoff resets once a subscription is established.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.redis_urls.is_empty() {
                tracing::warn!("No Redis nodes for cache invalidation; listener not started");
                return;
            }

            let mut backoff = INITIAL_BACKOFF;
            let mut node = 0usize;

            loop {
                let url = &self.redis_urls[node % self.redis_urls.len()];
                let e = self.run(url, &mut backoff).await;
                tracing::error!(
                    error = %e,
                    node = %redact(url),
                    backoff_secs = backoff.as_secs(),
                    "Cache invalidation listener error, reconnecting..."
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                node = node.wrapping_add(1);
            }
        })
    }

    /// Subscribe through `url` and evict keys until the connection ends.
    async fn run(&self, url: &str, backoff: &mut Duration) -> String {
        use futures_util::StreamExt;

        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(e) => return format!("failed to create Redis client: {e}"),
        };
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(e) => return format!("failed to get pub/sub connection: {e}"),
        };
        if let Err(e) = pubsub.subscribe(INVALIDATION_CHANNEL).await {
            return format!("failed to subscribe: {e}");
        }
        *backoff = INITIAL_BACKOFF;
        tracing::info!(
            channel = INVALIDATION_CHANNEL,
            node = %redact(url),
            "Subscribed to cache invalidation channel"
        );

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            match msg.get_payload::<String>() {
                Ok(key) => {
                    tracing::debug!(key = %key, "received cache invalidation");
                    self.local_cache.remove(&key);
                }
                Err(e) => tracing::warn!(error = %e, "failed to parse invalidation message payload"),
            }
        }
        "pub/sub connection closed".to_string()
    }
}

/// Node URL with any credentials stripped, for logging.
fn redact(url: &str) -> &str {
    url.rsplit('@').next().unwrap_or(url)
}
