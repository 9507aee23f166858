//! Redis cluster node discovery from properties.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::properties::PropertiesLoader;
use crate::{ConfigError, Result};

/// Key prefix for cluster node entries (`shiro.redis.cluster.address1=...`).
pub const CLUSTER_ADDRESS_PREFIX: &str = "shiro.redis.cluster.address";

/// A Redis node address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAndPort {
    pub host: String,
    pub port: u16,
}

impl HostAndPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`, splitting at the last colon.
    pub fn parse(key: &str, raw: &str) -> Result<Self> {
        if !address_pattern().is_match(raw) {
            return Err(ConfigError::invalid_value(
                key,
                format!("'{raw}' is not a host:port address"),
            ));
        }
        let raw = raw.trim();
        let (host, port) = raw
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::invalid_value(key, format!("'{raw}' has no port")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::invalid_value(key, format!("port '{port}' is out of range")))?;
        if port == 0 {
            return Err(ConfigError::invalid_value(key, "port must be > 0"));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for HostAndPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^.+:\d{1,5}\s*$").expect("valid address regex"))
}

/// Collect cluster node addresses in declaration order, without duplicates.
///
/// A value may hold several comma-separated addresses.
pub fn cluster_addresses(loader: &PropertiesLoader, prefix: &str) -> Result<Vec<HostAndPort>> {
    let mut nodes: Vec<HostAndPort> = Vec::new();
    for (key, value) in loader.keys_with_prefix(prefix) {
        for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let node = HostAndPort::parse(key, entry)?;
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
    }
    Ok(nodes)
}
