//! Per-route authorization.
//!
//! Where a chain rule protects a URL pattern, a guard protects one handler:
//!
//! ```ignore
//! let guard = AuthorizationGuard::permissions(security, ["session:read"])?;
//! let app = Router::new()
//!     .route(
//!         "/api/sessions",
//!         get(list_sessions).route_layer(middleware::from_fn_with_state(guard, require_authorization)),
//!     )
//!     .layer(middleware::from_fn_with_state(filter, security_filter));
//! ```
//!
//! The guard reads the [`Subject`] left by [`super::security_filter`], so it
//! must sit inside that middleware. Failures are answered as JSON:
//! 401 without a subject, 403 when a role or permission is missing.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AuthResult;
use crate::error::AuthError;
use crate::permission::WildcardPermission;
use crate::security::{SecurityManager, Subject};

/// What a guarded handler demands of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Every listed role.
    Roles(Vec<String>),
    /// Every listed permission.
    Permissions(Vec<String>),
}

#[derive(Clone)]
pub struct AuthorizationGuard {
    security: Arc<SecurityManager>,
    requirement: Arc<Requirement>,
}

impl AuthorizationGuard {
    pub fn roles<I, S>(security: Arc<SecurityManager>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            security,
            requirement: Arc::new(Requirement::Roles(roles.into_iter().map(Into::into).collect())),
        }
    }

    /// # Errors
    ///
    /// `Configuration` if a permission string is malformed, so bad guards
    /// fail when the router is built rather than on first request.
    pub fn permissions<I, S>(security: Arc<SecurityManager>, permissions: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let permissions: Vec<String> = permissions.into_iter().map(Into::into).collect();
        for permission in &permissions {
            WildcardPermission::parse(permission)?;
        }
        Ok(Self {
            security,
            requirement: Arc::new(Requirement::Permissions(permissions)),
        })
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    /// `Ok` if `subject` satisfies the requirement.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for an anonymous subject, `Unauthorized` when the
    /// subject lacks a role or permission.
    pub async fn check(&self, subject: &Subject) -> AuthResult<()> {
        if !subject.is_authenticated() {
            return Err(AuthError::unauthenticated("authentication required"));
        }

        let (allowed, wanted) = match self.requirement.as_ref() {
            Requirement::Roles(roles) => (
                self.security.has_all_roles(subject, roles).await?,
                format!("roles {roles:?}"),
            ),
            Requirement::Permissions(permissions) => (
                self.security.is_permitted_all(subject, permissions).await?,
                format!("permissions {permissions:?}"),
            ),
        };
        if allowed {
            Ok(())
        } else {
            Err(AuthError::unauthorized(format!("requires {wanted}")))
        }
    }
}

/// Axum middleware running an [`AuthorizationGuard`]; attach with `route_layer`.
pub async fn require_authorization(
    State(guard): State<AuthorizationGuard>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let subject = req.extensions().get::<Subject>().cloned().unwrap_or_default();
    match guard.check(&subject).await {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::info!(
                path = %req.uri().path(),
                principal = subject.principal.as_deref().unwrap_or_default(),
                reason = %e,
                "Guarded handler denied"
            );
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AuthenticationToken;
    use crate::filter::{FilterRegistry, ShiroFilter, security_filter};
    use crate::security::tests::security_manager;
    use axum::{
        Router,
        http::{StatusCode, header},
        middleware,
        routing::get,
    };
    use daijie_config::{FilterChainDefinitions, FilterSettings};
    use tower::ServiceExt;

    fn app(security: Arc<SecurityManager>) -> Router {
        let settings = FilterSettings {
            chain: FilterChainDefinitions::new(),
            ..FilterSettings::default()
        };
        let filter = ShiroFilter::from_settings(
            Arc::clone(&security),
            &settings,
            &FilterRegistry::with_builtins(),
        )
        .unwrap();

        let admins = AuthorizationGuard::roles(Arc::clone(&security), ["admin"]);
        let readers = AuthorizationGuard::permissions(security, ["report:read"]).unwrap();
        Router::new()
            .route(
                "/admin",
                get(|| async { "admin" })
                    .route_layer(middleware::from_fn_with_state(admins, require_authorization)),
            )
            .route(
                "/reports",
                get(|| async { "reports" })
                    .route_layer(middleware::from_fn_with_state(readers, require_authorization)),
            )
            .route("/open", get(|| async { "open" }))
            .layer(middleware::from_fn_with_state(Arc::new(filter), security_filter))
    }

    async fn cookie_for(security: &SecurityManager, user: &str, password: &str) -> String {
        let session = security
            .login(&AuthenticationToken::new(user, password), None)
            .await
            .unwrap();
        format!("{}={}", security.sessions().cookie().name, session.id)
    }

    fn request(path: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_malformed_permission_is_rejected_up_front() {
        let security = Arc::new(security_manager());
        assert!(AuthorizationGuard::permissions(security, ["report::"]).is_err());
    }

    #[tokio::test]
    async fn test_guards_enforce_roles_and_permissions() {
        let security = Arc::new(security_manager());
        let app = app(Arc::clone(&security));
        let alice = cookie_for(&security, "alice", "wonderland").await;
        let bob = cookie_for(&security, "bob", "builder").await;

        let response = app.clone().oneshot(request("/open", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(request("/admin", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.clone().oneshot(request("/admin", Some(&alice))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(request("/admin", Some(&bob))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.clone().oneshot(request("/reports", Some(&bob))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // alice holds user:* only
        let response = app.oneshot(request("/reports", Some(&alice))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
