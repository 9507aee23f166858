//! Credential tokens and matching.
//!
//! Stored credentials are Argon2id hashes in PHC string format. Submitted
//! passwords are verified against them; plaintext passwords are never stored.
//!
//! # Example
//!
//! ```
//! use daijie_auth::credentials::{
//!     AuthenticationToken, CredentialsMatcher, TokenCredentialsMatcher, hash_credentials,
//! };
//! use daijie_auth::realm::AuthenticationInfo;
//!
//! let hash = hash_credentials("secret").unwrap();
//! let info = AuthenticationInfo::new("alice", hash, "users");
//!
//! let matcher = TokenCredentialsMatcher::new();
//! assert!(matcher.do_credentials_match(&AuthenticationToken::new("alice", "secret"), &info));
//! assert!(!matcher.do_credentials_match(&AuthenticationToken::new("alice", "nope"), &info));
//! ```

use std::fmt;
use std::sync::OnceLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;

use crate::realm::AuthenticationInfo;

/// Username/password pair submitted at login.
#[derive(Clone, Deserialize)]
pub struct AuthenticationToken {
    pub username: String,
    pub password: String,
    /// Remote host the login came from, if known.
    #[serde(default)]
    pub host: Option<String>,
}

impl AuthenticationToken {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            host: None,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

impl fmt::Debug for AuthenticationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationToken")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .finish()
    }
}

/// Decides whether submitted credentials match stored account credentials.
pub trait CredentialsMatcher: Send + Sync {
    fn do_credentials_match(&self, token: &AuthenticationToken, info: &AuthenticationInfo) -> bool;
}

/// Verifies passwords against stored Argon2 PHC hashes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenCredentialsMatcher;

impl TokenCredentialsMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialsMatcher for TokenCredentialsMatcher {
    fn do_credentials_match(&self, token: &AuthenticationToken, info: &AuthenticationInfo) -> bool {
        match verify_credentials(&token.password, &info.credentials) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!(
                    principal = %info.principal,
                    error = %e,
                    "Stored credentials are not a valid PHC hash"
                );
                false
            }
        }
    }
}

/// Hash a password for storage using Argon2id.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_credentials(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Hash of a throwaway password, verified in place of a missing account so
/// unknown usernames cost the same Argon2 work as wrong passwords.
pub(crate) fn decoy_hash() -> &'static str {
    static DECOY: OnceLock<String> = OnceLock::new();
    DECOY.get_or_init(|| hash_credentials("daijie-decoy-credentials").unwrap_or_default())
}

/// Verify a password against a PHC hash.
///
/// Returns `Err` only if the hash cannot be parsed.
pub fn verify_credentials(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
