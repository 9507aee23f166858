//! Session lifecycle.

use std::sync::Arc;
use std::time::Duration;

use daijie_config::SessionSettings;
use serde_json::Value;

use super::{Session, SessionCookie, SessionDao, SessionIdGenerator};
use crate::AuthResult;
use crate::error::AuthError;

/// Starts, resolves, and expires sessions stored in a [`SessionDao`].
#[derive(Clone)]
pub struct SessionManager {
    dao: Arc<dyn SessionDao>,
    id_generator: Arc<dyn SessionIdGenerator>,
    cookie: SessionCookie,
    global_timeout: Duration,
    validation_scheduler_enabled: bool,
    validation_interval: Duration,
    session_id_cookie_enabled: bool,
}

impl SessionManager {
    pub fn new(
        dao: Arc<dyn SessionDao>,
        id_generator: Arc<dyn SessionIdGenerator>,
        cookie: SessionCookie,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            dao,
            id_generator,
            cookie,
            global_timeout: settings.global_timeout,
            validation_scheduler_enabled: settings.validation_scheduler_enabled,
            validation_interval: settings.validation_interval,
            session_id_cookie_enabled: settings.session_id_cookie_enabled,
        }
    }

    /// Create and persist a new session.
    pub async fn start(&self, host: Option<String>) -> AuthResult<Session> {
        let session = Session::new(self.id_generator.generate_id(), host, self.global_timeout);
        self.dao.create(&session).await?;
        tracing::debug!(session_id = %session.id, "Session started");
        Ok(session)
    }

    /// Resolve a live session and record the access.
    ///
    /// Expired or stopped sessions are deleted and reported as absent.
    pub async fn get(&self, id: &str) -> AuthResult<Option<Session>> {
        let Some(mut session) = self.dao.read(id).await? else {
            return Ok(None);
        };

        if !session.is_valid() {
            tracing::debug!(session_id = %id, stopped = session.is_stopped(), "Discarding invalid session");
            self.dao.delete(id).await?;
            return Ok(None);
        }

        session.touch();
        if !self.dao.update(&session).await? {
            // Stopped while this request was reading it.
            tracing::debug!(session_id = %id, "Session removed during access");
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Set an attribute on a live session.
    ///
    /// # Errors
    ///
    /// `InvalidSession` if the session does not exist or has expired.
    pub async fn set_attribute(&self, id: &str, key: &str, value: Value) -> AuthResult<Session> {
        let mut session = self
            .get(id)
            .await?
            .ok_or_else(|| AuthError::invalid_session(format!("session {id} is not valid")))?;
        session.set_attribute(key, value);
        if !self.dao.update(&session).await? {
            return Err(AuthError::invalid_session(format!("session {id} was stopped")));
        }
        Ok(session)
    }

    /// Stop a session and remove it from storage. Unknown ids are ignored.
    pub async fn stop(&self, id: &str) -> AuthResult<()> {
        if let Some(mut session) = self.dao.read(id).await? {
            session.stop();
            self.dao.delete(id).await?;
            tracing::debug!(session_id = %id, "Session stopped");
        }
        Ok(())
    }

    /// Delete every stored session that is no longer valid.
    ///
    /// Returns the number of sessions removed.
    pub async fn validate_sessions(&self) -> AuthResult<usize> {
        let mut removed = 0;
        for session in self.dao.active_sessions().await? {
            if !session.is_valid() {
                self.dao.delete(&session.id).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Invalid sessions removed");
        }
        Ok(removed)
    }

    /// Number of stored sessions that are still valid.
    pub async fn active_count(&self) -> AuthResult<usize> {
        Ok(self
            .dao
            .active_sessions()
            .await?
            .iter()
            .filter(|session| session.is_valid())
            .count())
    }

    pub fn cookie(&self) -> &SessionCookie {
        &self.cookie
    }

    pub fn global_timeout(&self) -> Duration {
        self.global_timeout
    }

    pub fn is_validation_scheduler_enabled(&self) -> bool {
        self.validation_scheduler_enabled
    }

    pub fn validation_interval(&self) -> Duration {
        self.validation_interval
    }

    pub fn is_session_id_cookie_enabled(&self) -> bool {
        self.session_id_cookie_enabled
    }
}
