//! Integration tests for Redis session storage and caching.
//!
//! Tests use testcontainers to spin up a real Redis instance.

use std::sync::Arc;
use std::time::Duration;

use daijie_auth::cache::CacheManager;
use daijie_auth::session::{Session, SessionDao};
use daijie_auth_redis::{
    CacheInvalidationListener, RedisCacheManager, RedisManager, RedisSessionDao,
    create_redis_manager,
};
use daijie_config::RedisSettings;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, u16)> = OnceCell::const_new();

async fn redis_settings() -> RedisSettings {
    let (_, port) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let port = container.get_host_port_ipv4(6379).await.expect("get port");
            (container, port)
        })
        .await;

    RedisSettings {
        port: *port,
        timeout: Duration::from_secs(5),
        ..RedisSettings::default()
    }
}

async fn manager() -> RedisManager {
    create_redis_manager(&redis_settings().await)
        .await
        .expect("redis reachable")
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_basic_commands() {
    let redis = manager().await;
    assert_eq!(redis.mode(), "standalone");

    redis
        .set_ex("daijie:test:key", b"value", Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(redis.get("daijie:test:key").await.unwrap(), Some(b"value".to_vec()));

    redis.del("daijie:test:key").await.unwrap();
    assert_eq!(redis.get("daijie:test:key").await.unwrap(), None);

    redis.sadd("daijie:test:set", "a").await.unwrap();
    redis.sadd("daijie:test:set", "b").await.unwrap();
    redis.srem("daijie:test:set", "a").await.unwrap();
    assert_eq!(redis.smembers("daijie:test:set").await.unwrap(), vec!["b".to_string()]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_session_dao_round_trip() {
    let dao = RedisSessionDao::new(manager().await);
    let mut session = Session::new("redis-s1", Some("10.0.0.9".into()), Duration::from_secs(60));

    dao.create(&session).await.unwrap();
    assert!(dao.create(&session).await.is_err());

    session.set_attribute("daijie.principal", serde_json::json!("alice"));
    assert!(dao.update(&session).await.unwrap());

    let stored = dao.read("redis-s1").await.unwrap().unwrap();
    assert_eq!(stored.principal(), Some("alice"));
    assert_eq!(stored.host.as_deref(), Some("10.0.0.9"));

    let active = dao.active_sessions().await.unwrap();
    assert!(active.iter().any(|s| s.id == "redis-s1"));

    dao.delete("redis-s1").await.unwrap();
    assert!(dao.read("redis-s1").await.unwrap().is_none());

    // A late write from an in-flight request must not bring it back
    assert!(!dao.update(&session).await.unwrap());
    assert!(dao.read("redis-s1").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_expired_sessions_are_pruned_from_index() {
    let redis = manager().await;
    let dao = RedisSessionDao::new(redis.clone());
    let session = Session::new("redis-short", None, Duration::from_secs(1));
    dao.create(&session).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let active = dao.active_sessions().await.unwrap();
    assert!(active.iter().all(|s| s.id != "redis-short"));
    let index = redis.smembers("shiro_redis_session:index").await.unwrap();
    assert!(!index.contains(&"redis-short".to_string()));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cache_shared_between_instances() {
    let redis = manager().await;
    let first = RedisCacheManager::new(redis.clone());
    let second = RedisCacheManager::new(redis.clone());

    first
        .get_cache("authorizationCache")
        .put("alice", b"admin".to_vec())
        .await;
    first.flush().await;

    let value = second.get_cache("authorizationCache").get("alice").await;
    assert_eq!(value, Some(Arc::new(b"admin".to_vec())));
    assert_eq!(second.local_cache().len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_invalidation_reaches_other_instances() {
    let redis = manager().await;
    let first = RedisCacheManager::new(redis.clone());
    let second = RedisCacheManager::new(redis.clone());

    let listener = CacheInvalidationListener {
        redis_urls: redis.pubsub_urls().to_vec(),
        local_cache: Arc::clone(second.local_cache()),
    }
    .start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let cache = second.get_cache("authorizationCache");
    cache.put("bob", b"staff".to_vec()).await;
    assert!(second.local_cache().contains_key("shiro_redis_cache:authorizationCache:bob"));

    first.get_cache("authorizationCache").remove("bob").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(second.local_cache().is_empty());
    listener.abort();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_put_then_remove_leaves_no_l2_entry() {
    let redis = manager().await;
    let cache_manager = RedisCacheManager::new(redis.clone());
    let cache = cache_manager.get_cache("authorizationCache");

    for round in 0..50 {
        let principal = format!("carol-{round}");
        cache.put(&principal, b"admin".to_vec()).await;
        cache.remove(&principal).await;
        cache_manager.flush().await;

        let key = format!("shiro_redis_cache:authorizationCache:{principal}");
        assert_eq!(redis.get(&key).await.unwrap(), None, "stale L2 entry for {key}");
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_create_is_exclusive_and_update_needs_existing_key() {
    let dao = RedisSessionDao::new(manager().await);
    let session = Session::new("redis-exclusive", None, Duration::from_secs(60));

    assert!(!dao.update(&session).await.unwrap());
    assert!(dao.read("redis-exclusive").await.unwrap().is_none());

    let (a, b) = tokio::join!(dao.create(&session), dao.create(&session));
    assert!(a.is_ok() ^ b.is_ok());

    dao.delete("redis-exclusive").await.unwrap();
}
