//! The security manager: login, logout, and subject resolution.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::AuthResult;
use crate::cache::CacheManager;
use crate::credentials::AuthenticationToken;
use crate::error::AuthError;
use crate::permission::WildcardPermission;
use crate::realm::{AUTHORIZATION_CACHE, AuthorizingRealm};
use crate::session::{PRINCIPAL_ATTRIBUTE, Session, SessionManager};

/// The caller of a request, as seen by the security layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub principal: Option<String>,
    pub host: Option<String>,
    #[serde(skip)]
    pub session_id: Option<String>,
}

impl Subject {
    pub fn anonymous() -> Self {
        Self::default()
    }

    fn from_session(session: &Session) -> Self {
        Self {
            principal: session.principal().map(str::to_string),
            host: session.host.clone(),
            session_id: Some(session.id.clone()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// Has a live session, authenticated or not.
    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }
}

/// Coordinates the realm, sessions and caches.
#[derive(Clone)]
pub struct SecurityManager {
    realm: AuthorizingRealm,
    sessions: SessionManager,
    cache_manager: Arc<dyn CacheManager>,
}

impl SecurityManager {
    /// Wire the realm to the `authorizationCache` of `cache_manager`.
    pub fn new(
        realm: AuthorizingRealm,
        sessions: SessionManager,
        cache_manager: Arc<dyn CacheManager>,
    ) -> Self {
        let realm = realm.with_authorization_cache(cache_manager.get_cache(AUTHORIZATION_CACHE));
        Self {
            realm,
            sessions,
            cache_manager,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn realm(&self) -> &AuthorizingRealm {
        &self.realm
    }

    pub fn cache_mode(&self) -> &'static str {
        self.cache_manager.mode()
    }

    /// Authenticate `token` and start a session for the principal.
    ///
    /// # Errors
    ///
    /// `UnknownAccount` or `IncorrectCredentials` when the realm rejects the
    /// token; storage errors from the session DAO.
    pub async fn login(&self, token: &AuthenticationToken, host: Option<String>) -> AuthResult<Session> {
        let info = match self.realm.authenticate(token).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(principal = %token.username, error = %e, "Login failed");
                return Err(e);
            }
        };

        let host = host.or_else(|| token.host.clone());
        let session = self.sessions.start(host).await?;
        let session = self
            .sessions
            .set_attribute(
                &session.id,
                PRINCIPAL_ATTRIBUTE,
                Value::String(info.principal.clone()),
            )
            .await?;

        tracing::info!(
            principal = %info.principal,
            realm = %info.realm_name,
            session_id = %session.id,
            "Login succeeded"
        );
        Ok(session)
    }

    /// Resolve the subject for a request. Missing or invalid sessions yield
    /// an anonymous subject.
    pub async fn subject(&self, session_id: Option<&str>) -> AuthResult<Subject> {
        let Some(id) = session_id else {
            return Ok(Subject::anonymous());
        };
        Ok(self
            .sessions
            .get(id)
            .await?
            .map(|session| Subject::from_session(&session))
            .unwrap_or_default())
    }

    /// Stop the session and drop cached authorization for its principal.
    pub async fn logout(&self, session_id: &str) -> AuthResult<()> {
        if let Some(session) = self.sessions.get(session_id).await? {
            if let Some(principal) = session.principal() {
                self.realm.clear_cached_authorization(principal).await;
                tracing::info!(principal = %principal, session_id = %session_id, "Logged out");
            }
        }
        self.sessions.stop(session_id).await
    }

    /// `true` if the subject is authenticated and holds every role.
    pub async fn has_all_roles(&self, subject: &Subject, roles: &[String]) -> AuthResult<bool> {
        let Some(principal) = subject.principal.as_deref() else {
            return Ok(false);
        };
        let info = self.realm.authorization(principal).await?;
        Ok(roles.iter().all(|role| info.has_role(role)))
    }

    /// `true` if the subject is authenticated and is granted every permission.
    ///
    /// # Errors
    ///
    /// `Configuration` if a required permission string is malformed.
    pub async fn is_permitted_all(&self, subject: &Subject, permissions: &[String]) -> AuthResult<bool> {
        let required = permissions
            .iter()
            .map(|p| WildcardPermission::parse(p))
            .collect::<Result<Vec<_>, AuthError>>()?;

        let Some(principal) = subject.principal.as_deref() else {
            return Ok(false);
        };
        let info = self.realm.authorization(principal).await?;
        Ok(required.iter().all(|p| info.is_permitted(p)))
    }
}
