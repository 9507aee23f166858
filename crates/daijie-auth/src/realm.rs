//! Realms: account lookup and authorization data.
//!
//! A [`Realm`] knows where accounts live. [`AuthorizingRealm`] wraps a realm
//! with a credentials matcher and an optional authorization cache, and is
//! what the security manager talks to.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use daijie_config::RealmSettings;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::cache::Cache;
use crate::credentials::{AuthenticationToken, CredentialsMatcher, decoy_hash};
use crate::error::AuthError;
use crate::permission::WildcardPermission;

/// Name of the cache holding per-principal authorization info.
pub const AUTHORIZATION_CACHE: &str = "authorizationCache";

/// Stored account data used to check a login attempt.
#[derive(Debug, Clone)]
pub struct AuthenticationInfo {
    pub principal: String,
    /// Stored credential hash.
    pub credentials: String,
    pub realm_name: String,
}

impl AuthenticationInfo {
    pub fn new(
        principal: impl Into<String>,
        credentials: impl Into<String>,
        realm_name: impl Into<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            credentials: credentials.into(),
            realm_name: realm_name.into(),
        }
    }
}

/// Roles and permission strings granted to a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationInfo {
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl AuthorizationInfo {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns `true` if any granted permission implies `permission`.
    ///
    /// Granted strings that fail to parse are skipped.
    pub fn is_permitted(&self, permission: &WildcardPermission) -> bool {
        self.permissions
            .iter()
            .filter_map(|granted| WildcardPermission::parse(granted).ok())
            .any(|granted| granted.implies(permission))
    }
}

/// Source of accounts and their grants.
#[async_trait]
pub trait Realm: Send + Sync {
    fn name(&self) -> &str;

    /// Look up the account for a login attempt. `Ok(None)` if unknown.
    async fn authentication_info(
        &self,
        token: &AuthenticationToken,
    ) -> AuthResult<Option<AuthenticationInfo>>;

    /// Load roles and permissions for an authenticated principal.
    async fn authorization_info(&self, principal: &str) -> AuthResult<AuthorizationInfo>;
}

/// Properties-backed realm (`shiro.users.*` / `shiro.roles.*`).
#[derive(Debug, Clone)]
pub struct UserAuthorizingRealm {
    name: String,
    settings: RealmSettings,
}

impl UserAuthorizingRealm {
    pub fn new(settings: RealmSettings) -> Self {
        Self {
            name: "UserAuthorizingRealm".to_string(),
            settings,
        }
    }

    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.settings.users.keys().map(String::as_str)
    }

    fn role_permissions(&self) -> &IndexMap<String, Vec<String>> {
        &self.settings.roles
    }
}

#[async_trait]
impl Realm for UserAuthorizingRealm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authentication_info(
        &self,
        token: &AuthenticationToken,
    ) -> AuthResult<Option<AuthenticationInfo>> {
        Ok(self.settings.users.get(&token.username).map(|user| {
            AuthenticationInfo::new(&token.username, &user.password_hash, &self.name)
        }))
    }

    async fn authorization_info(&self, principal: &str) -> AuthResult<AuthorizationInfo> {
        let Some(user) = self.settings.users.get(principal) else {
            return Ok(AuthorizationInfo::default());
        };

        let roles: BTreeSet<String> = user.roles.iter().cloned().collect();
        let permissions = roles
            .iter()
            .filter_map(|role| self.role_permissions().get(role))
            .flatten()
            .cloned()
            .collect();

        Ok(AuthorizationInfo { roles, permissions })
    }
}

/// A realm plus credential matching and authorization caching.
#[derive(Clone)]
pub struct AuthorizingRealm {
    realm: Arc<dyn Realm>,
    matcher: Arc<dyn CredentialsMatcher>,
    authorization_cache: Option<Arc<dyn Cache>>,
}

impl AuthorizingRealm {
    pub fn new(realm: Arc<dyn Realm>, matcher: Arc<dyn CredentialsMatcher>) -> Self {
        Self {
            realm,
            matcher,
            authorization_cache: None,
        }
    }

    /// Attach the cache used for authorization info.
    #[must_use]
    pub fn with_authorization_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.authorization_cache = Some(cache);
        self
    }

    pub fn name(&self) -> &str {
        self.realm.name()
    }

    pub fn has_authorization_cache(&self) -> bool {
        self.authorization_cache.is_some()
    }

    /// Check a login attempt.
    ///
    /// # Errors
    ///
    /// `UnknownAccount` if the realm has no such user, `IncorrectCredentials`
    /// if the matcher rejects the password.
    pub async fn authenticate(&self, token: &AuthenticationToken) -> AuthResult<AuthenticationInfo> {
        let Some(info) = self.realm.authentication_info(token).await? else {
            let decoy = AuthenticationInfo::new(&token.username, decoy_hash(), self.realm.name());
            let _ = self.matcher.do_credentials_match(token, &decoy);
            return Err(AuthError::unknown_account(&token.username));
        };

        if !self.matcher.do_credentials_match(token, &info) {
            tracing::info!(
                principal = %token.username,
                realm = %self.realm.name(),
                "Credentials rejected"
            );
            return Err(AuthError::incorrect_credentials(&token.username));
        }

        Ok(info)
    }

    /// Roles and permissions for `principal`, read through the cache.
    pub async fn authorization(&self, principal: &str) -> AuthResult<AuthorizationInfo> {
        if let Some(cache) = &self.authorization_cache {
            if let Some(bytes) = cache.get(principal).await {
                match serde_json::from_slice::<AuthorizationInfo>(&bytes) {
                    Ok(info) => return Ok(info),
                    Err(e) => {
                        tracing::warn!(principal = %principal, error = %e, "Discarding unreadable cached authorization");
                        cache.remove(principal).await;
                    }
                }
            }
        }

        let info = self.realm.authorization_info(principal).await?;

        if let Some(cache) = &self.authorization_cache {
            match serde_json::to_vec(&info) {
                Ok(bytes) => cache.put(principal, bytes).await,
                Err(e) => tracing::warn!(principal = %principal, error = %e, "Failed to encode authorization"),
            }
        }

        Ok(info)
    }

    pub async fn clear_cached_authorization(&self, principal: &str) {
        if let Some(cache) = &self.authorization_cache {
            cache.remove(principal).await;
        }
    }
}
