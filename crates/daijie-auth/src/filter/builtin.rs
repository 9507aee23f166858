//! Built-in access filters.
//!
//! | name | filter |
//! |------|--------|
//! | `anon` | [`AnonymousFilter`] |
//! | `authc` | [`FormAuthenticationFilter`] |
//! | `user` | [`UserFilter`] |
//! | `logout` | [`LogoutFilter`] |
//! | `roles` | [`RolesAuthorizationFilter`] |
//! | `perms` | [`PermissionsAuthorizationFilter`] |

use std::sync::Arc;

use async_trait::async_trait;

use super::{AccessFilter, FilterContext, FilterOutcome, FilterRequest, redirect};
use crate::AuthResult;

/// Path under which the built-ins are registered in a
/// [`FilterRegistry`](super::FilterRegistry).
pub const BUILTIN_PATH: &str = "daijie_auth::filter::builtin";

/// Where `logout` sends the browser afterwards.
pub const LOGOUT_REDIRECT_URL: &str = "/";

/// The six built-in filters, keyed by their chain names.
pub fn defaults() -> Vec<Arc<dyn AccessFilter>> {
    vec![
        Arc::new(AnonymousFilter),
        Arc::new(FormAuthenticationFilter),
        Arc::new(UserFilter),
        Arc::new(LogoutFilter::default()),
        Arc::new(RolesAuthorizationFilter),
        Arc::new(PermissionsAuthorizationFilter),
    ]
}

/// Lets every request through.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousFilter;

#[async_trait]
impl AccessFilter for AnonymousFilter {
    fn name(&self) -> &str {
        "anon"
    }

    async fn on_access(
        &self,
        _request: &FilterRequest<'_>,
        _context: &FilterContext,
    ) -> AuthResult<FilterOutcome> {
        Ok(FilterOutcome::Continue)
    }
}

/// Requires an authenticated subject. The login URL itself stays reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormAuthenticationFilter;

#[async_trait]
impl AccessFilter for FormAuthenticationFilter {
    fn name(&self) -> &str {
        "authc"
    }

    async fn on_access(
        &self,
        request: &FilterRequest<'_>,
        context: &FilterContext,
    ) -> AuthResult<FilterOutcome> {
        if request.subject.is_authenticated() || context.is_login_request(request) {
            return Ok(FilterOutcome::Continue);
        }
        Ok(FilterOutcome::Respond(context.deny_unauthenticated(request)))
    }
}

/// Requires a known user. Without remember-me this is an authenticated one.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserFilter;

#[async_trait]
impl AccessFilter for UserFilter {
    fn name(&self) -> &str {
        "user"
    }

    async fn on_access(
        &self,
        request: &FilterRequest<'_>,
        context: &FilterContext,
    ) -> AuthResult<FilterOutcome> {
        if request.subject.principal.is_some() || context.is_login_request(request) {
            return Ok(FilterOutcome::Continue);
        }
        Ok(FilterOutcome::Respond(context.deny_unauthenticated(request)))
    }
}

/// Ends the session, clears the session cookie and redirects.
#[derive(Debug, Clone)]
pub struct LogoutFilter {
    redirect_url: String,
}

impl LogoutFilter {
    pub fn new(redirect_url: impl Into<String>) -> Self {
        Self {
            redirect_url: redirect_url.into(),
        }
    }
}

impl Default for LogoutFilter {
    fn default() -> Self {
        Self::new(LOGOUT_REDIRECT_URL)
    }
}

#[async_trait]
impl AccessFilter for LogoutFilter {
    fn name(&self) -> &str {
        "logout"
    }

    async fn on_access(
        &self,
        request: &FilterRequest<'_>,
        context: &FilterContext,
    ) -> AuthResult<FilterOutcome> {
        if let Some(session_id) = request.subject.session_id.as_deref() {
            context.security.logout(session_id).await?;
        }

        let mut response = redirect(&self.redirect_url);
        context.clear_session_cookie(&mut response);
        Ok(FilterOutcome::Respond(response))
    }
}

/// `roles[a, b]`: the subject must hold every listed role.
#[derive(Debug, Default, Clone, Copy)]
pub struct RolesAuthorizationFilter;

#[async_trait]
impl AccessFilter for RolesAuthorizationFilter {
    fn name(&self) -> &str {
        "roles"
    }

    async fn on_access(
        &self,
        request: &FilterRequest<'_>,
        context: &FilterContext,
    ) -> AuthResult<FilterOutcome> {
        if !request.subject.is_authenticated() {
            return Ok(FilterOutcome::Respond(context.deny_unauthenticated(request)));
        }
        if context
            .security
            .has_all_roles(request.subject, request.config)
            .await?
        {
            return Ok(FilterOutcome::Continue);
        }
        Ok(FilterOutcome::Respond(context.deny_unauthorized(
            request,
            format!("missing role in [{}]", request.config.join(", ")),
        )))
    }
}

/// `perms[a:b, c:d]`: the subject must be granted every listed permission.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionsAuthorizationFilter;

#[async_trait]
impl AccessFilter for PermissionsAuthorizationFilter {
    fn name(&self) -> &str {
        "perms"
    }

    async fn on_access(
        &self,
        request: &FilterRequest<'_>,
        context: &FilterContext,
    ) -> AuthResult<FilterOutcome> {
        if !request.subject.is_authenticated() {
            return Ok(FilterOutcome::Respond(context.deny_unauthenticated(request)));
        }
        if context
            .security
            .is_permitted_all(request.subject, request.config)
            .await?
        {
            return Ok(FilterOutcome::Continue);
        }
        Ok(FilterOutcome::Respond(context.deny_unauthorized(
            request,
            format!("missing permission in [{}]", request.config.join(", ")),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AuthenticationToken;
    use crate::security::Subject;
    use crate::security::tests::security_manager;
    use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};

    fn context() -> FilterContext {
        FilterContext::new(Arc::new(security_manager()), "/login", "/", "/403")
    }

    async fn login(context: &FilterContext, user: &str, password: &str) -> Subject {
        let session = context
            .security
            .login(&AuthenticationToken::new(user, password), None)
            .await
            .unwrap();
        context.security.subject(Some(&session.id)).await.unwrap()
    }

    async fn run(
        filter: &dyn AccessFilter,
        context: &FilterContext,
        path: &str,
        headers: &HeaderMap,
        subject: &Subject,
        config: &[String],
    ) -> FilterOutcome {
        let request = FilterRequest {
            method: &Method::GET,
            path,
            headers,
            subject,
            config,
        };
        filter.on_access(&request, context).await.unwrap()
    }

    fn status(outcome: FilterOutcome) -> Option<StatusCode> {
        match outcome {
            FilterOutcome::Continue => None,
            FilterOutcome::Respond(response) => Some(response.status()),
        }
    }

    #[test]
    fn test_default_names() {
        let names: Vec<String> = defaults().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, ["anon", "authc", "user", "logout", "roles", "perms"]);
    }

    #[tokio::test]
    async fn test_anon_always_continues() {
        let ctx = context();
        let outcome = run(&AnonymousFilter, &ctx, "/x", &HeaderMap::new(), &Subject::anonymous(), &[]).await;
        assert!(matches!(outcome, FilterOutcome::Continue));
    }

    #[tokio::test]
    async fn test_authc_redirects_browsers_and_rejects_api_clients() {
        let ctx = context();
        let anonymous = Subject::anonymous();

        let outcome = run(&FormAuthenticationFilter, &ctx, "/reports", &HeaderMap::new(), &anonymous, &[]).await;
        let FilterOutcome::Respond(response) = outcome else {
            panic!("expected redirect");
        };
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");

        let mut json = HeaderMap::new();
        json.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let outcome = run(&FormAuthenticationFilter, &ctx, "/reports", &json, &anonymous, &[]).await;
        assert_eq!(status(outcome), Some(StatusCode::UNAUTHORIZED));

        let outcome = run(&FormAuthenticationFilter, &ctx, "/login", &HeaderMap::new(), &anonymous, &[]).await;
        assert!(matches!(outcome, FilterOutcome::Continue));

        let alice = login(&ctx, "alice", "wonderland").await;
        let outcome = run(&UserFilter, &ctx, "/reports", &HeaderMap::new(), &alice, &[]).await;
        assert!(matches!(outcome, FilterOutcome::Continue));
    }

    #[tokio::test]
    async fn test_roles_and_perms() {
        let ctx = context();
        let alice = login(&ctx, "alice", "wonderland").await;
        let bob = login(&ctx, "bob", "builder").await;
        let headers = HeaderMap::new();
        let admin = vec!["admin".to_string()];
        let delete = vec!["user:delete".to_string()];

        assert_eq!(status(run(&RolesAuthorizationFilter, &ctx, "/admin", &headers, &alice, &admin).await), None);
        let outcome = run(&RolesAuthorizationFilter, &ctx, "/admin", &headers, &bob, &admin).await;
        let FilterOutcome::Respond(response) = outcome else {
            panic!("expected redirect");
        };
        assert_eq!(response.headers()[header::LOCATION], "/403");

        assert_eq!(status(run(&PermissionsAuthorizationFilter, &ctx, "/users", &headers, &alice, &delete).await), None);
        assert_eq!(
            status(run(&PermissionsAuthorizationFilter, &ctx, "/api/users", &headers, &bob, &delete).await),
            Some(StatusCode::FORBIDDEN)
        );
        assert_eq!(
            status(run(&PermissionsAuthorizationFilter, &ctx, "/users", &headers, &Subject::anonymous(), &delete).await),
            Some(StatusCode::FOUND)
        );
    }

    #[tokio::test]
    async fn test_logout_stops_session_and_clears_cookie() {
        let ctx = context();
        let alice = login(&ctx, "alice", "wonderland").await;
        let session_id = alice.session_id.clone().unwrap();

        let outcome = run(&LogoutFilter::default(), &ctx, "/logout", &HeaderMap::new(), &alice, &[]).await;
        let FilterOutcome::Respond(response) = outcome else {
            panic!("expected redirect");
        };
        assert_eq!(response.headers()[header::LOCATION], "/");
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("mySessionId="));

        assert!(!ctx.security.subject(Some(&session_id)).await.unwrap().is_authenticated());
    }
}
