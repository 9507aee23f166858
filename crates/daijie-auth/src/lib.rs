//! # daijie-auth
//!
//! Session-based security for Daijie services.
//!
//! This crate provides:
//! - Login with Argon2 credential matching against a properties-backed realm
//! - Role and wildcard-permission checks with cached authorization info
//! - Server-side sessions with a cookie-carried id and periodic validation
//! - URL filter chains (`anon`, `authc`, `roles[...]`, ...) as axum middleware
//!
//! ## Modules
//!
//! - [`credentials`] - Authentication tokens and the credentials matcher
//! - [`realm`] - Account lookup and authorization info
//! - [`permission`] - Wildcard permissions
//! - [`cache`] - Named cache traits and the in-memory cache manager
//! - [`session`] - Sessions, session storage, the session cookie and validation
//! - [`security`] - The security manager and [`Subject`]
//! - [`filter`] - Ant path matching, filter chains and the axum middleware
//!
//! Redis-backed session storage and caching live in `daijie-auth-redis`.

pub mod cache;
pub mod credentials;
pub mod error;
pub mod filter;
pub mod permission;
pub mod realm;
pub mod security;
pub mod session;

pub use cache::{Cache, CacheManager, MemoryCacheManager};
pub use credentials::{AuthenticationToken, CredentialsMatcher, TokenCredentialsMatcher};
pub use error::{AuthError, ErrorCategory};
pub use filter::{
    AccessFilter, AuthorizationGuard, CurrentSubject, FilterContext, FilterOutcome,
    FilterRegistry, ShiroFilter, require_authorization, security_filter,
};
pub use permission::WildcardPermission;
pub use realm::{AuthorizingRealm, Realm, UserAuthorizingRealm};
pub use security::{SecurityManager, Subject};
pub use session::{
    MemorySessionDao, SchedulerHandle, Session, SessionCookie, SessionDao, SessionIdGenerator,
    SessionManager, SessionValidationScheduler, UuidSessionIdGenerator,
};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;
