use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use daijie_auth::{AuthError, AuthenticationToken, CurrentSubject, SecurityManager};
use daijie_auth_redis::RedisManager;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::assembly::SecurityComponents;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub security: Arc<SecurityManager>,
    pub redis: Option<RedisManager>,
    pub login_url: String,
    pub success_url: String,
    pub unauthorized_url: String,
}

impl AppState {
    pub fn from_components(components: &SecurityComponents) -> Self {
        let filter = &components.settings.filter;
        Self {
            security: Arc::clone(&components.security),
            redis: components.redis.clone(),
            login_url: filter.login_url.clone(),
            success_url: filter.success_url.clone(),
            unauthorized_url: filter.unauthorized_url.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn root(CurrentSubject(subject): CurrentSubject) -> impl IntoResponse {
    let body = json!({
        "service": "Daijie Server",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "authenticated": subject.is_authenticated(),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Ready once the session store answers. Without Redis there is nothing to check.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let (status, redis) = match &state.redis {
        None => (StatusCode::OK, json!({ "configured": false })),
        Some(redis) => match redis.ping().await {
            Ok(()) => (
                StatusCode::OK,
                json!({ "configured": true, "mode": redis.mode(), "reachable": true }),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Redis readiness check failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "configured": true, "mode": redis.mode(), "reachable": false }),
                )
            }
        },
    };

    let body = json!({
        "status": if status == StatusCode::OK { "ready" } else { "unavailable" },
        "cache": state.security.cache_mode(),
        "session_store": if state.redis.is_some() { "redis" } else { "memory" },
        "redis": redis,
    });
    (status, Json(body))
}

/// Tells clients where and how to post credentials.
pub async fn login_form(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "login_url": state.login_url,
        "method": "POST",
        "fields": ["username", "password"],
    });
    (StatusCode::OK, Json(body))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let sessions = state.security.sessions();

    // A fresh login replaces whatever session the client still holds.
    if let Some(previous) = sessions.cookie().read_session_id(&headers) {
        state.security.logout(&previous).await?;
    }

    let host = client_host(&headers);
    let mut token = AuthenticationToken::new(request.username, request.password);
    if let Some(host) = &host {
        token = token.with_host(host.clone());
    }
    let session = state.security.login(&token, host).await?;

    let body = json!({
        "authenticated": true,
        "principal": token.username,
        "redirect": state.success_url,
    });
    let mut response = (StatusCode::OK, Json(body)).into_response();
    if sessions.is_session_id_cookie_enabled() {
        let cookie = sessions.cookie().build(&session.id).to_string();
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| AuthError::internal(format!("invalid session cookie: {e}")))?;
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

pub async fn unauthorized(CurrentSubject(subject): CurrentSubject) -> impl IntoResponse {
    let body = json!({
        "error": "unauthorized",
        "message": "You do not have permission to access this resource",
        "principal": subject.principal,
    });
    (StatusCode::FORBIDDEN, Json(body))
}

/// The current subject with its roles and permissions.
pub async fn current_subject(
    State(state): State<AppState>,
    CurrentSubject(subject): CurrentSubject,
) -> Result<Json<serde_json::Value>, AuthError> {
    let Some(principal) = subject.principal.as_deref() else {
        return Err(AuthError::unauthenticated("no authenticated subject"));
    };
    let info = state.security.realm().authorization(principal).await?;
    Ok(Json(json!({
        "subject": subject,
        "roles": info.roles,
        "permissions": info.permissions,
    })))
}

/// Number of live sessions in the session store.
pub async fn active_sessions(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AuthError> {
    let count = state.security.sessions().active_count().await?;
    Ok(Json(json!({ "active_sessions": count })))
}

/// First hop of `X-Forwarded-For`, if present.
fn client_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_host_uses_first_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_host(&headers), None);

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        assert_eq!(client_host(&headers).as_deref(), Some("10.0.0.1"));
    }
}
