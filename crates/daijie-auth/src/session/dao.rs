//! Session persistence.
//!
//! # Implementations
//!
//! - [`MemorySessionDao`] - per-instance `DashMap`
//! - `RedisSessionDao` (in `daijie-auth-redis`) - shared across instances

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::Session;
use crate::AuthResult;
use crate::error::AuthError;

/// Storage interface for sessions.
#[async_trait]
pub trait SessionDao: Send + Sync {
    /// Persist a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if a session with the same id already exists or the
    /// backend is unavailable.
    async fn create(&self, session: &Session) -> AuthResult<()>;

    /// Load a session by id. Returns stored sessions regardless of validity.
    async fn read(&self, id: &str) -> AuthResult<Option<Session>>;

    /// Overwrite a stored session. Never recreates a deleted one.
    ///
    /// Returns `false` when no session with that id is stored.
    async fn update(&self, session: &Session) -> AuthResult<bool>;

    async fn delete(&self, id: &str) -> AuthResult<()>;

    /// Every stored session, used by validation sweeps.
    async fn active_sessions(&self) -> AuthResult<Vec<Session>>;
}

/// In-process session storage.
#[derive(Clone, Default)]
pub struct MemorySessionDao {
    sessions: Arc<DashMap<String, Session>>,
}

impl MemorySessionDao {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionDao for MemorySessionDao {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        use dashmap::mapref::entry::Entry;

        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage(format!(
                "session {} already exists",
                session.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn read(&self, id: &str) -> AuthResult<Option<Session>> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn update(&self, session: &Session) -> AuthResult<bool> {
        match self.sessions.get_mut(&session.id) {
            Some(mut stored) => {
                *stored = session.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> AuthResult<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn active_sessions(&self) -> AuthResult<Vec<Session>> {
        Ok(self.sessions.iter().map(|s| s.value().clone()).collect())
    }
}
