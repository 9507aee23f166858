//! Sessions stored in Redis, shared by every instance.
//!
//! Each session is a MessagePack blob under `shiro_redis_session:<id>` that
//! expires with the session timeout. The set `shiro_redis_session:index`
//! lists ids for validation sweeps; ids whose blob has expired are pruned
//! when the index is read. Commands are issued one key at a time so the
//! same code works against a cluster.

use async_trait::async_trait;
use daijie_auth::AuthResult;
use daijie_auth::error::AuthError;
use daijie_auth::session::{Session, SessionDao};

use crate::client::{RedisManager, RedisStoreError};

pub const SESSION_KEY_PREFIX: &str = "shiro_redis_session:";
pub const SESSION_INDEX_KEY: &str = "shiro_redis_session:index";

#[derive(Clone)]
pub struct RedisSessionDao {
    redis: RedisManager,
}

impl RedisSessionDao {
    pub fn new(redis: RedisManager) -> Self {
        Self { redis }
    }

    fn session_key(id: &str) -> String {
        format!("{SESSION_KEY_PREFIX}{id}")
    }

    fn encode(session: &Session) -> Result<Vec<u8>, RedisStoreError> {
        rmp_serde::to_vec_named(session).map_err(|e| RedisStoreError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Session, RedisStoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| RedisStoreError::Decode(e.to_string()))
    }

    /// Load and decode; unreadable blobs are deleted and reported as absent.
    async fn load(&self, id: &str) -> AuthResult<Option<Session>> {
        let Some(bytes) = self.redis.get(&Self::session_key(id)).await? else {
            return Ok(None);
        };
        match Self::decode(&bytes) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Dropping unreadable session");
                self.delete(id).await?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl SessionDao for RedisSessionDao {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        let bytes = Self::encode(session)?;
        let created = self
            .redis
            .set_nx_ex(&Self::session_key(&session.id), &bytes, session.timeout)
            .await?;
        if !created {
            return Err(AuthError::storage(format!(
                "session {} already exists",
                session.id
            )));
        }
        self.redis.sadd(SESSION_INDEX_KEY, &session.id).await?;
        tracing::debug!(session_id = %session.id, "Session stored in Redis");
        Ok(())
    }

    async fn read(&self, id: &str) -> AuthResult<Option<Session>> {
        self.load(id).await
    }

    async fn update(&self, session: &Session) -> AuthResult<bool> {
        let bytes = Self::encode(session)?;
        // XX keeps a concurrent delete from being undone.
        let updated = self
            .redis
            .set_xx_ex(&Self::session_key(&session.id), &bytes, session.timeout)
            .await?;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> AuthResult<()> {
        self.redis.del(&Self::session_key(id)).await?;
        self.redis.srem(SESSION_INDEX_KEY, id).await?;
        Ok(())
    }

    async fn active_sessions(&self) -> AuthResult<Vec<Session>> {
        let ids = self.redis.smembers(SESSION_INDEX_KEY).await?;
        let mut sessions = Vec::with_capacity(ids.len());
        let mut pruned = 0usize;

        for id in ids {
            match self.load(&id).await? {
                Some(session) => sessions.push(session),
                None => {
                    self.redis.srem(SESSION_INDEX_KEY, &id).await?;
                    pruned += 1;
                }
            }
        }

        if pruned > 0 {
            tracing::debug!(pruned, "Pruned expired ids from session index");
        }
        Ok(sessions)
    }
}
