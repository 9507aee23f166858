//! URL filter chains and the axum middleware that runs them.
//!
//! Chain definitions map Ant-style patterns to filter rules:
//!
//! ```text
//! /login        = anon
//! /logout       = logout
//! /admin/**     = authc, roles[admin]
//! /api/users/** = authc, perms["user:read,write"]
//! /**           = authc
//! ```
//!
//! For each request the first matching pattern (declaration order) is
//! selected and its filters run left to right. A filter either lets the
//! request continue or answers it directly. Requests matching no pattern
//! pass through unfiltered.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use daijie_auth::filter::{FilterRegistry, ShiroFilter, security_filter};
//!
//! let filter = ShiroFilter::from_settings(security, &settings.filter, &FilterRegistry::with_builtins())?;
//! let app = Router::new()
//!     .route("/", get(index))
//!     .layer(middleware::from_fn_with_state(Arc::new(filter), security_filter));
//! ```

pub mod ant;
pub mod builtin;
pub mod chain;
pub mod guard;
pub mod registry;

pub use ant::AntPathMatcher;
pub use chain::{ChainEntry, FilterChainResolver, FilterInvocation, parse_rule};
pub use guard::{AuthorizationGuard, Requirement, require_authorization};
pub use registry::{FilterRegistry, filter_name};

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use daijie_config::FilterSettings;
use indexmap::IndexMap;

use crate::AuthResult;
use crate::error::AuthError;
use crate::security::{SecurityManager, Subject};

// =============================================================================
// Filter contract
// =============================================================================

/// What a filter decided about a request.
pub enum FilterOutcome {
    /// Run the next filter, then the handler.
    Continue,
    /// Stop here and send this response.
    Respond(Response),
}

/// The parts of a request a filter may inspect.
pub struct FilterRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    pub subject: &'a Subject,
    /// Values from the filter's `[...]` in the chain rule.
    pub config: &'a [String],
}

impl FilterRequest<'_> {
    /// API clients get JSON errors instead of redirects.
    pub fn wants_json(&self) -> bool {
        let accepts_json = self
            .headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"));
        let ajax = self
            .headers
            .get("x-requested-with")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));

        accepts_json || ajax || self.path.starts_with("/api/")
    }
}

/// A named access check in a filter chain.
#[async_trait]
pub trait AccessFilter: Send + Sync {
    /// Default chain name of this filter.
    fn name(&self) -> &str;

    async fn on_access(
        &self,
        request: &FilterRequest<'_>,
        context: &FilterContext,
    ) -> AuthResult<FilterOutcome>;
}

/// Shared state handed to every filter.
#[derive(Clone)]
pub struct FilterContext {
    pub security: Arc<SecurityManager>,
    pub login_url: String,
    pub success_url: String,
    pub unauthorized_url: String,
    matcher: AntPathMatcher,
}

impl FilterContext {
    pub fn new(
        security: Arc<SecurityManager>,
        login_url: impl Into<String>,
        success_url: impl Into<String>,
        unauthorized_url: impl Into<String>,
    ) -> Self {
        Self {
            security,
            login_url: login_url.into(),
            success_url: success_url.into(),
            unauthorized_url: unauthorized_url.into(),
            matcher: AntPathMatcher::new(),
        }
    }

    pub fn is_login_request(&self, request: &FilterRequest<'_>) -> bool {
        self.matcher.matches(&self.login_url, request.path)
    }

    /// Redirect to the login URL, or 401 for API clients.
    pub fn deny_unauthenticated(&self, request: &FilterRequest<'_>) -> Response {
        tracing::debug!(path = %request.path, "Unauthenticated request denied");
        if request.wants_json() {
            return AuthError::unauthenticated("authentication required").into_response();
        }
        redirect(&self.login_url)
    }

    /// Redirect to the unauthorized URL, or 403 for API clients.
    pub fn deny_unauthorized(&self, request: &FilterRequest<'_>, message: String) -> Response {
        tracing::info!(
            path = %request.path,
            principal = request.subject.principal.as_deref().unwrap_or_default(),
            reason = %message,
            "Access denied"
        );
        if request.wants_json() || self.unauthorized_url.is_empty() {
            return AuthError::unauthorized(message).into_response();
        }
        redirect(&self.unauthorized_url)
    }

    /// Append a `Set-Cookie` that removes the session id cookie.
    pub fn clear_session_cookie(&self, response: &mut Response) {
        let removal = self.security.sessions().cookie().removal();
        append_cookie(response, &removal.to_string());
    }
}

/// `302 Found` to `location`.
pub fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => AuthError::internal(format!("invalid redirect location '{location}'")).into_response(),
    }
}

pub(crate) fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Unable to encode Set-Cookie header"),
    }
}

// =============================================================================
// Filter chain
// =============================================================================

/// Installed filters plus the pattern table that selects them.
pub struct ShiroFilter {
    context: FilterContext,
    filters: IndexMap<String, Arc<dyn AccessFilter>>,
    resolver: FilterChainResolver,
}

impl ShiroFilter {
    /// Install built-in and configured filters and compile the chain table.
    ///
    /// # Errors
    ///
    /// `Configuration` for a filter name missing from `registry`, a
    /// malformed chain rule, or a rule naming a filter that is not installed.
    pub fn from_settings(
        security: Arc<SecurityManager>,
        settings: &FilterSettings,
        registry: &FilterRegistry,
    ) -> AuthResult<Self> {
        let mut filters: IndexMap<String, Arc<dyn AccessFilter>> = builtin::defaults()
            .into_iter()
            .map(|filter| (filter.name().to_string(), filter))
            .collect();

        for qualified in &settings.filter_names {
            let (name, filter) = registry.instantiate(qualified)?;
            tracing::info!(filter = %name, class = %qualified, "Filter installed");
            filters.insert(name, filter);
        }

        let mut resolver = FilterChainResolver::new();
        for (pattern, rule) in settings.chain.iter() {
            let invocations = parse_rule(rule)?;
            if let Some(unknown) = invocations
                .iter()
                .find(|inv| !filters.contains_key(&inv.name))
            {
                return Err(AuthError::configuration(format!(
                    "chain '{pattern}' references unknown filter '{}'",
                    unknown.name
                )));
            }
            resolver.push(pattern, invocations);
        }

        tracing::info!(
            filters = filters.len(),
            chains = resolver.entries().len(),
            login_url = %settings.login_url,
            "Filter chain configured"
        );

        Ok(Self {
            context: FilterContext::new(
                security,
                &settings.login_url,
                &settings.success_url,
                &settings.unauthorized_url,
            ),
            filters,
            resolver,
        })
    }

    pub fn context(&self) -> &FilterContext {
        &self.context
    }

    pub fn security(&self) -> &Arc<SecurityManager> {
        &self.context.security
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn resolver(&self) -> &FilterChainResolver {
        &self.resolver
    }

    /// Run the chain selected for `path`. `None` means the request may proceed.
    async fn apply(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        subject: &Subject,
    ) -> AuthResult<Option<Response>> {
        let Some(entry) = self.resolver.resolve(path) else {
            return Ok(None);
        };

        for invocation in &entry.filters {
            let Some(filter) = self.filters.get(&invocation.name) else {
                return Err(AuthError::configuration(format!(
                    "filter '{}' is not installed",
                    invocation.name
                )));
            };
            let request = FilterRequest {
                method,
                path,
                headers,
                subject,
                config: &invocation.config,
            };
            if let FilterOutcome::Respond(response) = filter.on_access(&request, &self.context).await? {
                tracing::debug!(path = %path, pattern = %entry.pattern, filter = %invocation.name, "Request answered by filter");
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Axum middleware: resolves the [`Subject`] and runs the matching chain.
///
/// The subject is stored in request extensions for [`CurrentSubject`].
pub async fn security_filter(
    State(filter): State<Arc<ShiroFilter>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let sessions = filter.security().sessions();
    let session_id = if sessions.is_session_id_cookie_enabled() {
        sessions.cookie().read_session_id(req.headers())
    } else {
        None
    };

    let subject = match filter.security().subject(session_id.as_deref()).await {
        Ok(subject) => subject,
        Err(e) => return e.into_response(),
    };
    let stale_cookie = session_id.is_some() && !subject.has_session();

    let path = req.uri().path().to_string();
    let outcome = filter
        .apply(req.method(), &path, req.headers(), &subject)
        .await;

    let mut response = match outcome {
        Ok(Some(response)) => response,
        Ok(None) => {
            req.extensions_mut().insert(subject);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    };

    if stale_cookie && !response.headers().contains_key(header::SET_COOKIE) {
        filter.context().clear_session_cookie(&mut response);
    }
    response
}

// =============================================================================
// Extractor
// =============================================================================

/// Extracts the [`Subject`] resolved by [`security_filter`].
///
/// Anonymous when the middleware is not installed.
#[derive(Debug, Clone)]
pub struct CurrentSubject(pub Subject);

impl<S> FromRequestParts<S> for CurrentSubject
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<Subject>()
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::tests::security_manager;
    use axum::{Router, middleware, routing::get};
    use daijie_config::FilterChainDefinitions;
    use tower::ServiceExt;

    fn settings(rules: &[(&str, &str)]) -> FilterSettings {
        let mut chain = FilterChainDefinitions::new();
        for (pattern, rule) in rules {
            chain.insert(*pattern, *rule);
        }
        FilterSettings {
            filter_names: Vec::new(),
            login_url: "/login".to_string(),
            success_url: "/".to_string(),
            unauthorized_url: "/403".to_string(),
            chain,
        }
    }

    async fn whoami(CurrentSubject(subject): CurrentSubject) -> String {
        subject.principal.unwrap_or_else(|| "anonymous".to_string())
    }

    fn app(filter: ShiroFilter) -> Router {
        Router::new()
            .route("/login", get(|| async { "login" }))
            .route("/open", get(whoami))
            .route("/admin", get(whoami))
            .route("/private", get(whoami))
            .layer(middleware::from_fn_with_state(Arc::new(filter), security_filter))
    }

    fn get_request(path: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_unknown_filter_in_chain_is_rejected() {
        let security = Arc::new(security_manager());
        let err = ShiroFilter::from_settings(
            Arc::clone(&security),
            &settings(&[("/**", "authc, captcha")]),
            &FilterRegistry::with_builtins(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("captcha"));

        let mut bad_class = settings(&[("/**", "anon")]);
        bad_class.filter_names = vec!["com.example.Missing".to_string()];
        assert!(ShiroFilter::from_settings(security, &bad_class, &FilterRegistry::new()).is_err());
    }

    #[test]
    fn test_configured_filter_names_are_installed() {
        let mut settings = settings(&[("/**", "Open")]);
        settings.filter_names = vec!["com.example.Open".to_string()];
        let mut registry = FilterRegistry::new();
        registry.register("com.example.Open", || Arc::new(builtin::AnonymousFilter));

        let filter =
            ShiroFilter::from_settings(Arc::new(security_manager()), &settings, &registry).unwrap();
        assert!(filter.filter_names().any(|name| name == "Open"));
        assert_eq!(filter.resolver().entries()[0].filters[0].name, "Open");
    }

    #[tokio::test]
    async fn test_middleware_enforces_chain() {
        let security = Arc::new(security_manager());
        let filter = ShiroFilter::from_settings(
            Arc::clone(&security),
            &settings(&[
                ("/login", "anon"),
                ("/open", "anon"),
                ("/admin", "authc, roles[admin]"),
                ("/**", "authc"),
            ]),
            &FilterRegistry::with_builtins(),
        )
        .unwrap();
        let app = app(filter);

        let response = app.clone().oneshot(get_request("/open", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous");

        let response = app.clone().oneshot(get_request("/private", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");

        let session = security
            .login(&crate::credentials::AuthenticationToken::new("bob", "builder"), None)
            .await
            .unwrap();
        let cookie = format!("mySessionId={}", session.id);

        let response = app
            .clone()
            .oneshot(get_request("/private", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "bob");

        let response = app
            .clone()
            .oneshot(get_request("/admin", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/403");
    }

    #[tokio::test]
    async fn test_stale_cookie_is_cleared() {
        let filter = ShiroFilter::from_settings(
            Arc::new(security_manager()),
            &settings(&[("/**", "anon")]),
            &FilterRegistry::with_builtins(),
        )
        .unwrap();

        let response = app(filter)
            .oneshot(get_request("/open", Some("mySessionId=gone")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_default_chain_matches_nothing() {
        let mut settings = settings(&[]);
        settings.chain = FilterChainDefinitions::allow_all();
        let filter = ShiroFilter::from_settings(
            Arc::new(security_manager()),
            &settings,
            &FilterRegistry::with_builtins(),
        )
        .unwrap();

        let response = app(filter).oneshot(get_request("/private", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
