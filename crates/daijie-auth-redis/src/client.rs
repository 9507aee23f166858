//! Redis connection pools for standalone servers and clusters.

use std::time::Duration;

use daijie_config::{HostAndPort, RedisSettings};
use deadpool_redis::{PoolConfig, Runtime};
use redis::AsyncCommands;

/// Errors from Redis-backed storage.
#[derive(Debug, thiserror::Error)]
pub enum RedisStoreError {
    #[error("Redis pool error: {0}")]
    Pool(String),

    #[error("Redis command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("Redis command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to encode value: {0}")]
    Encode(String),

    #[error("Failed to decode value: {0}")]
    Decode(String),
}

impl RedisStoreError {
    #[must_use]
    pub fn pool(err: impl std::fmt::Display) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<RedisStoreError> for daijie_auth::AuthError {
    fn from(err: RedisStoreError) -> Self {
        Self::storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RedisStoreError>;

#[derive(Clone)]
enum RedisPool {
    Standalone(deadpool_redis::Pool),
    Cluster(deadpool_redis::cluster::Pool),
}

/// Pooled Redis access with every command bounded by a timeout.
#[derive(Clone)]
pub struct RedisManager {
    pool: RedisPool,
    urls: Vec<String>,
    timeout: Duration,
}

/// Run `$body` on a pooled connection of either pool kind, under the
/// manager's command timeout.
macro_rules! with_conn {
    ($manager:expr, |$conn:ident| $body:expr) => {{
        let manager = &$manager;
        let op = async {
            match &manager.pool {
                RedisPool::Standalone(pool) => {
                    let mut $conn = pool.get().await.map_err(RedisStoreError::pool)?;
                    Ok::<_, RedisStoreError>($body.await?)
                }
                RedisPool::Cluster(pool) => {
                    let mut $conn = pool.get().await.map_err(RedisStoreError::pool)?;
                    Ok::<_, RedisStoreError>($body.await?)
                }
            }
        };
        match tokio::time::timeout(manager.timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(RedisStoreError::Timeout(manager.timeout)),
        }
    }};
}

/// `redis://[:password@]host:port`
///
/// The password is percent-encoded; the client decodes it again when
/// parsing the URL.
pub fn node_url(node: &HostAndPort, password: Option<&str>) -> String {
    match password {
        Some(password) => format!(
            "redis://:{}@{}:{}",
            urlencoding::encode(password),
            node.host,
            node.port
        ),
        None => format!("redis://{}:{}", node.host, node.port),
    }
}

fn pool_config(settings: &RedisSettings) -> PoolConfig {
    let mut config = PoolConfig::new(settings.pool.max_total);
    config.timeouts.wait = settings.pool.max_wait;
    config.timeouts.create = Some(settings.connection_timeout);
    config.timeouts.recycle = Some(settings.connection_timeout);
    config
}

impl RedisManager {
    /// Build the pool described by `settings`. No connection is opened yet.
    ///
    /// Cluster mode is used when cluster node addresses are configured,
    /// otherwise a standalone pool for `host:port`.
    pub fn new(settings: &RedisSettings) -> Result<Self> {
        let password = settings.password.as_deref();

        if settings.is_cluster() {
            let urls: Vec<String> = settings
                .cluster_nodes
                .iter()
                .map(|node| node_url(node, password))
                .collect();
            let mut config = deadpool_redis::cluster::Config::from_urls(urls.clone());
            config.pool = Some(pool_config(settings));
            let pool = config
                .create_pool(Some(Runtime::Tokio1))
                .map_err(RedisStoreError::pool)?;

            tracing::info!(nodes = urls.len(), "Redis cluster pool created");
            return Ok(Self {
                pool: RedisPool::Cluster(pool),
                urls,
                timeout: settings.timeout,
            });
        }

        let url = node_url(&settings.primary_node(), password);
        let mut config = deadpool_redis::Config::from_url(url.clone());
        config.pool = Some(pool_config(settings));
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(RedisStoreError::pool)?;

        tracing::info!(host = %settings.host, port = settings.port, "Redis pool created");
        Ok(Self {
            pool: RedisPool::Standalone(pool),
            urls: vec![url],
            timeout: settings.timeout,
        })
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self.pool, RedisPool::Cluster(_))
    }

    pub fn mode(&self) -> &'static str {
        if self.is_cluster() { "cluster" } else { "standalone" }
    }

    /// Node URLs usable for a dedicated pub/sub connection. In a cluster
    /// any node receives every published message.
    pub fn pubsub_urls(&self) -> &[String] {
        &self.urls
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn ping(&self) -> Result<()> {
        with_conn!(self, |conn| redis::cmd("PING").query_async::<String>(&mut conn))?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        with_conn!(self, |conn| conn.get::<_, Option<Vec<u8>>>(key))
    }

    /// `SETEX` with the TTL rounded down to whole seconds, at least one.
    pub async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let seconds = ttl.as_secs().max(1);
        with_conn!(self, |conn| conn.set_ex::<_, _, ()>(key, value, seconds))
    }

    /// `SET key value NX EX ttl`: write only if `key` is absent.
    /// Returns whether the value was written.
    pub async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.set_conditional(key, value, ttl, "NX").await
    }

    /// `SET key value XX EX ttl`: write only if `key` already exists.
    /// Returns whether the value was written.
    pub async fn set_xx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.set_conditional(key, value, ttl, "XX").await
    }

    async fn set_conditional(&self, key: &str, value: &[u8], ttl: Duration, condition: &str) -> Result<bool> {
        let seconds = ttl.as_secs().max(1);
        let reply = with_conn!(self, |conn| redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg(condition)
            .arg("EX")
            .arg(seconds)
            .query_async::<Option<String>>(&mut conn))?;
        Ok(reply.is_some())
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        with_conn!(self, |conn| conn.del::<_, ()>(key))
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        with_conn!(self, |conn| conn.sadd::<_, _, ()>(key, member))
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<()> {
        with_conn!(self, |conn| conn.srem::<_, _, ()>(key, member))
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        with_conn!(self, |conn| conn.smembers::<_, Vec<String>>(key))
    }

    pub async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        with_conn!(self, |conn| conn.publish::<_, _, ()>(channel, message))
    }
}

/// Connect to Redis, or `None` when it is unreachable.
///
/// ## Graceful Degradation
///
/// If the pool cannot be built or the first `PING` fails, a warning is
/// logged and callers fall back to in-process session storage and caching.
pub async fn create_redis_manager(settings: &RedisSettings) -> Option<RedisManager> {
    let manager = match RedisManager::new(settings) {
        Ok(manager) => manager,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create Redis pool. Falling back to local storage.");
            return None;
        }
    };

    match manager.ping().await {
        Ok(()) => {
            tracing::info!(mode = manager.mode(), "Connected to Redis");
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to connect to Redis. Falling back to local storage.");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_url() {
        let node = HostAndPort::new("10.0.0.5", 7001);
        assert_eq!(node_url(&node, None), "redis://10.0.0.5:7001");
        assert_eq!(node_url(&node, Some("s3cret")), "redis://:s3cret@10.0.0.5:7001");
    }

    #[test]
    fn test_node_url_keeps_reserved_characters_in_password() {
        use redis::IntoConnectionInfo;

        let node = HostAndPort::new("10.0.0.5", 7001);
        for password in ["p#ss", "a/b", "q?x", "100%sure", "at@sign:colon", "sp ace"] {
            let info = node_url(&node, Some(password))
                .into_connection_info()
                .unwrap_or_else(|e| panic!("{password:?} did not parse: {e}"));
            assert_eq!(info.redis.password.as_deref(), Some(password));
            assert_eq!(
                info.addr,
                redis::ConnectionAddr::Tcp("10.0.0.5".to_string(), 7001)
            );
        }
    }

    #[test]
    fn test_pool_config_follows_settings() {
        let settings = RedisSettings::default();
        let config = pool_config(&settings);
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.timeouts.wait, None);
        assert_eq!(config.timeouts.create, Some(Duration::from_millis(1000)));
    }

    #[tokio::test]
    async fn test_standalone_and_cluster_modes() {
        let settings = RedisSettings::default();
        let manager = RedisManager::new(&settings).unwrap();
        assert_eq!(manager.mode(), "standalone");
        assert_eq!(manager.pubsub_urls(), ["redis://127.0.0.1:6379".to_string()]);
        assert_eq!(manager.timeout(), Duration::from_millis(360_000));

        let cluster = RedisSettings {
            cluster_nodes: vec![HostAndPort::new("10.0.0.1", 7000), HostAndPort::new("10.0.0.2", 7000)],
            password: Some("pw".to_string()),
            ..RedisSettings::default()
        };
        let manager = RedisManager::new(&cluster).unwrap();
        assert!(manager.is_cluster());
        assert_eq!(
            manager.pubsub_urls(),
            ["redis://:pw@10.0.0.1:7000".to_string(), "redis://:pw@10.0.0.2:7000".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back() {
        let settings = RedisSettings {
            port: 1,
            connection_timeout: Duration::from_millis(200),
            timeout: Duration::from_millis(500),
            ..RedisSettings::default()
        };
        assert!(create_redis_manager(&settings).await.is_none());
    }
}
