//! Server-side sessions.
//!
//! - [`Session`] - session state, persisted by a [`SessionDao`]
//! - [`SessionManager`] - lifecycle: start, touch, stop, validate
//! - [`SessionCookie`] - the session id cookie
//! - [`SessionValidationScheduler`] - periodic removal of expired sessions

pub mod cookie;
pub mod dao;
pub mod manager;
pub mod scheduler;

pub use cookie::SessionCookie;
pub use dao::{MemorySessionDao, SessionDao};
pub use manager::SessionManager;
pub use scheduler::{SchedulerHandle, SessionValidationScheduler};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Attribute holding the authenticated principal.
pub const PRINCIPAL_ATTRIBUTE: &str = "daijie.principal";

/// Generates new session identifiers.
pub trait SessionIdGenerator: Send + Sync {
    fn generate_id(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSessionIdGenerator;

impl SessionIdGenerator for UuidSessionIdGenerator {
    fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// A server-side session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub host: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_timestamp: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_access_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub stop_timestamp: Option<OffsetDateTime>,
    /// Maximum idle time before the session expires.
    pub timeout: Duration,
    pub attributes: Map<String, Value>,
}

impl Session {
    pub fn new(id: impl Into<String>, host: Option<String>, timeout: Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            host,
            start_timestamp: now,
            last_access_time: now,
            stop_timestamp: None,
            timeout,
            attributes: Map::new(),
        }
    }

    /// Idle longer than the timeout at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        let idle_ms = (now - self.last_access_time).whole_milliseconds();
        idle_ms > self.timeout.as_millis() as i128
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_timestamp.is_some()
    }

    /// Not stopped and not expired.
    pub fn is_valid(&self) -> bool {
        !self.is_stopped() && !self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Time left before this session expires when nothing touches it.
    pub fn remaining(&self) -> Duration {
        let idle_ms = (OffsetDateTime::now_utc() - self.last_access_time)
            .whole_milliseconds()
            .max(0) as u128;
        let timeout_ms = self.timeout.as_millis();
        Duration::from_millis(timeout_ms.saturating_sub(idle_ms) as u64)
    }

    pub fn touch(&mut self) {
        self.last_access_time = OffsetDateTime::now_utc();
    }

    pub fn stop(&mut self) {
        if self.stop_timestamp.is_none() {
            self.stop_timestamp = Some(OffsetDateTime::now_utc());
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// The authenticated principal, if this session carries one.
    pub fn principal(&self) -> Option<&str> {
        self.attribute(PRINCIPAL_ATTRIBUTE).and_then(Value::as_str)
    }
}
