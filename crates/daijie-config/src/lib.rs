//! Security configuration for Daijie
//!
//! This crate turns a `bootstrap.properties` file into typed settings for the
//! security stack:
//! - Loads Java-style properties with optional environment overrides
//! - Resolves every `shiro.*` key against its documented default
//! - Parses filter chain definitions (delimited string or JSON map)
//! - Discovers Redis cluster node addresses
//!
//! # Example
//!
//! ```
//! use daijie_config::{PropertiesLoader, ShiroSettings};
//!
//! let loader = PropertiesLoader::parse("shiro.loginUrl=/signin\n").unwrap();
//! let settings = ShiroSettings::resolve(&loader).unwrap();
//! assert_eq!(settings.filter.login_url, "/signin");
//! assert_eq!(settings.redis.port, 6379);
//! ```

pub mod chain;
pub mod cluster;
pub mod properties;
pub mod settings;

pub use chain::FilterChainDefinitions;
pub use cluster::{HostAndPort, cluster_addresses};
pub use properties::PropertiesLoader;
pub use settings::{
    FilterSettings, PoolSettings, RealmSettings, RedisSettings, SessionSettings, ShiroSettings,
    UserDefinition,
};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Properties error: {0}")]
    Properties(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub fn properties(msg: impl Into<String>) -> Self {
        Self::Properties(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
