//! Authentication and authorization error types.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Errors that can occur during authentication, authorization and session handling.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No account exists for the submitted principal.
    #[error("Unknown account: {username}")]
    UnknownAccount {
        /// The submitted username.
        username: String,
    },

    /// The submitted credentials do not match the stored ones.
    #[error("Incorrect credentials for {username}")]
    IncorrectCredentials {
        /// The submitted username.
        username: String,
    },

    /// The request lacks an authenticated subject.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Description of why the request is unauthenticated.
        message: String,
    },

    /// The subject lacks a required role or permission.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of the missing grant.
        message: String,
    },

    /// The session is unknown, expired or stopped.
    #[error("Invalid session: {message}")]
    InvalidSession {
        /// Description of the session problem.
        message: String,
    },

    /// An error occurred while storing or retrieving session or cache data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The security configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `UnknownAccount` error.
    #[must_use]
    pub fn unknown_account(username: impl Into<String>) -> Self {
        Self::UnknownAccount {
            username: username.into(),
        }
    }

    /// Creates a new `IncorrectCredentials` error.
    #[must_use]
    pub fn incorrect_credentials(username: impl Into<String>) -> Self {
        Self::IncorrectCredentials {
            username: username.into(),
        }
    }

    /// Creates a new `Unauthenticated` error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidSession` error.
    #[must_use]
    pub fn invalid_session(message: impl Into<String>) -> Self {
        Self::InvalidSession {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is an authentication error.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownAccount { .. }
                | Self::IncorrectCredentials { .. }
                | Self::Unauthenticated { .. }
                | Self::InvalidSession { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownAccount { .. }
            | Self::IncorrectCredentials { .. }
            | Self::Unauthenticated { .. } => ErrorCategory::Authentication,
            Self::Unauthorized { .. } => ErrorCategory::Authorization,
            Self::InvalidSession { .. } => ErrorCategory::Session,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Machine-readable error code used in JSON responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            // Unknown accounts and bad passwords look the same to clients.
            Self::UnknownAccount { .. } | Self::IncorrectCredentials { .. } => {
                "invalid_credentials"
            }
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidSession { .. } => "invalid_session",
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "server_error"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::UnknownAccount { .. }
            | Self::IncorrectCredentials { .. }
            | Self::Unauthenticated { .. }
            | Self::InvalidSession { .. } => StatusCode::UNAUTHORIZED,
            Self::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::UnknownAccount { .. } | Self::IncorrectCredentials { .. } => {
                "Invalid username or password".to_string()
            }
            // Do not leak storage details to clients
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Security error");
        } else {
            tracing::debug!(error = %self, category = %self.category(), "Request rejected");
        }

        let body = json!({
            "error": self.error_code(),
            "message": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

/// Categories of security errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    Session,
    Infrastructure,
    Configuration,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Session => write!(f, "session"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl From<daijie_config::ConfigError> for AuthError {
    fn from(err: daijie_config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}
