//! # daijie-auth-redis
//!
//! Redis-backed implementations of the `daijie-auth` storage traits, for
//! running several instances behind one load balancer.
//!
//! - [`client`] - standalone and cluster pools ([`RedisManager`])
//! - [`session`] - [`RedisSessionDao`]
//! - [`cache`] - [`RedisCacheManager`], L1 DashMap in front of Redis
//! - [`pubsub`] - L1 invalidation across instances
//!
//! ## Graceful Degradation
//!
//! [`create_redis_manager`] returns `None` when Redis cannot be reached so
//! callers can fall back to the in-memory implementations.

pub mod cache;
pub mod client;
pub mod pubsub;
pub mod session;

pub use cache::RedisCacheManager;
pub use client::{RedisManager, RedisStoreError, create_redis_manager};
pub use pubsub::CacheInvalidationListener;
pub use session::RedisSessionDao;
