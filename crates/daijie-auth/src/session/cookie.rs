//! Session id cookie.

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};

/// Template for the cookie carrying the session id.
///
/// Session-scoped (no `Max-Age`), `HttpOnly`, path `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: "/".to_string(),
            http_only: true,
            secure: false,
        }
    }

    /// Cookie that stores `session_id` in the browser.
    pub fn build(&self, session_id: &str) -> Cookie<'static> {
        Cookie::build((self.name.clone(), session_id.to_string()))
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
    }

    /// Cookie that removes the session id from the browser.
    pub fn removal(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.name.clone(), ""))
            .path(self.path.clone())
            .http_only(self.http_only)
            .build();
        cookie.make_removal();
        cookie
    }

    /// Read the session id from request headers.
    pub fn read_session_id(&self, headers: &HeaderMap) -> Option<String> {
        CookieJar::from_headers(headers)
            .get(&self.name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }
}
