//! Typed security settings resolved from properties.
//!
//! Every optional key falls back to the default below when it is absent or
//! empty. Pool sizing, session timeout and validation scheduling are fixed.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::{FilterChainDefinitions, split_tokens, unquote};
use crate::cluster::{CLUSTER_ADDRESS_PREFIX, HostAndPort, cluster_addresses};
use crate::properties::PropertiesLoader;
use crate::{ConfigError, Result};

pub const DEFAULT_LOGIN_URL: &str = "/login";
pub const DEFAULT_SUCCESS_URL: &str = "/";
pub const DEFAULT_UNAUTHORIZED_URL: &str = "/403";
pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_REDIS_TIMEOUT_MS: u64 = 360_000;
pub const DEFAULT_REDIS_CONNECTION_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_SESSION_ID_COOKIE: &str = "mySessionId";
pub const GLOBAL_SESSION_TIMEOUT_MS: u64 = 360_000;
pub const SESSION_VALIDATION_INTERVAL_MS: u64 = 3_600_000;

const USERS_PREFIX: &str = "shiro.users.";
const ROLES_PREFIX: &str = "shiro.roles.";

/// Everything the security assembler needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiroSettings {
    pub filter: FilterSettings,
    pub redis: RedisSettings,
    pub session: SessionSettings,
    pub realm: RealmSettings,
}

impl ShiroSettings {
    /// Resolve all settings, applying defaults.
    pub fn resolve(loader: &PropertiesLoader) -> Result<Self> {
        let settings = Self {
            filter: FilterSettings::resolve(loader)?,
            redis: RedisSettings::resolve(loader)?,
            session: SessionSettings::resolve(loader),
            realm: RealmSettings::resolve(loader),
        };
        info!(
            filters = settings.filter.filter_names.len(),
            chains = settings.filter.chain.len(),
            redis_mode = if settings.redis.is_cluster() { "cluster" } else { "standalone" },
            users = settings.realm.users.len(),
            "Security settings resolved"
        );
        Ok(settings)
    }
}

/// Filter factory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Fully qualified names from `shiro.filterClassNames`.
    pub filter_names: Vec<String>,
    pub login_url: String,
    pub success_url: String,
    pub unauthorized_url: String,
    pub chain: FilterChainDefinitions,
}

impl FilterSettings {
    pub fn resolve(loader: &PropertiesLoader) -> Result<Self> {
        let filter_names = loader
            .get_property("shiro.filterClassNames")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            filter_names,
            login_url: loader.get_or("shiro.loginUrl", DEFAULT_LOGIN_URL),
            success_url: loader.get_or("shiro.successUrl", DEFAULT_SUCCESS_URL),
            unauthorized_url: loader.get_or("shiro.unauthorizedUrl", DEFAULT_UNAUTHORIZED_URL),
            chain: FilterChainDefinitions::from_properties(loader)?,
        })
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            filter_names: Vec::new(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            success_url: DEFAULT_SUCCESS_URL.to_string(),
            unauthorized_url: DEFAULT_UNAUTHORIZED_URL.to_string(),
            chain: FilterChainDefinitions::allow_all(),
        }
    }
}

/// Connection pool sizing handed to the Redis pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    pub max_total: usize,
    pub min_idle: usize,
    pub max_idle: usize,
    /// `None` waits for a free connection indefinitely.
    pub max_wait: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_total: 1000,
            min_idle: 8,
            max_idle: 100,
            max_wait: None,
        }
    }
}

/// Redis client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    /// `None` when `shiro.redis.cluster.password` is empty.
    pub password: Option<String>,
    /// Command (socket) timeout.
    pub timeout: Duration,
    pub connection_timeout: Duration,
    /// Cluster nodes; empty means standalone against `host:port`.
    pub cluster_nodes: Vec<HostAndPort>,
    pub pool: PoolSettings,
}

impl RedisSettings {
    pub fn resolve(loader: &PropertiesLoader) -> Result<Self> {
        let port = match loader.get_integer("shiro.redis.port")? {
            None => DEFAULT_REDIS_PORT,
            Some(p) => u16::try_from(p)
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| ConfigError::invalid_value("shiro.redis.port", format!("{p} is not a valid port")))?,
        };

        let settings = Self {
            host: loader.get_or("shiro.redis.host", DEFAULT_REDIS_HOST),
            port,
            password: loader.get_property("shiro.redis.cluster.password"),
            timeout: millis(loader, "shiro.redis.timeout", DEFAULT_REDIS_TIMEOUT_MS)?,
            connection_timeout: millis(
                loader,
                "shiro.redis.connectionTimeout",
                DEFAULT_REDIS_CONNECTION_TIMEOUT_MS,
            )?,
            cluster_nodes: cluster_addresses(loader, CLUSTER_ADDRESS_PREFIX)?,
            pool: PoolSettings::default(),
        };
        debug!(
            host = %settings.host,
            port = settings.port,
            nodes = settings.cluster_nodes.len(),
            "Redis settings resolved"
        );
        Ok(settings)
    }

    pub fn is_cluster(&self) -> bool {
        !self.cluster_nodes.is_empty()
    }

    /// The standalone node address.
    pub fn primary_node(&self) -> HostAndPort {
        HostAndPort::new(self.host.clone(), self.port)
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            password: None,
            timeout: Duration::from_millis(DEFAULT_REDIS_TIMEOUT_MS),
            connection_timeout: Duration::from_millis(DEFAULT_REDIS_CONNECTION_TIMEOUT_MS),
            cluster_nodes: Vec::new(),
            pool: PoolSettings::default(),
        }
    }
}

fn millis(loader: &PropertiesLoader, key: &str, default: u64) -> Result<Duration> {
    match loader.get_integer(key)? {
        None => Ok(Duration::from_millis(default)),
        Some(ms) => u64::try_from(ms)
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::invalid_value(key, format!("{ms} must not be negative"))),
    }
}

/// Session manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub global_timeout: Duration,
    pub validation_scheduler_enabled: bool,
    pub validation_interval: Duration,
    pub session_id_cookie_enabled: bool,
}

impl SessionSettings {
    pub fn resolve(loader: &PropertiesLoader) -> Self {
        Self {
            cookie_name: loader.get_or("shiro.sessionid", DEFAULT_SESSION_ID_COOKIE),
            ..Self::default()
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_ID_COOKIE.to_string(),
            global_timeout: Duration::from_millis(GLOBAL_SESSION_TIMEOUT_MS),
            validation_scheduler_enabled: true,
            validation_interval: Duration::from_millis(SESSION_VALIDATION_INTERVAL_MS),
            session_id_cookie_enabled: true,
        }
    }
}

/// An account declared as `shiro.users.<name> = <hash>, role, role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDefinition {
    pub password_hash: String,
    pub roles: Vec<String>,
}

impl UserDefinition {
    /// Parse `<hash>[, role...]`.
    ///
    /// PHC hashes carry commas in their parameter section
    /// (`$argon2id$v=19$m=19456,t=2,p=1$salt$hash`), so for values starting
    /// with `$` the hash ends at the first comma after the last `$`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (hash, rest) = if value.starts_with('$') {
            let last_dollar = value.rfind('$').unwrap_or(0);
            match value[last_dollar..].find(',') {
                Some(offset) => {
                    let split = last_dollar + offset;
                    (&value[..split], &value[split + 1..])
                }
                None => (value, ""),
            }
        } else {
            match value.split_once(',') {
                Some((hash, rest)) => (hash, rest),
                None => (value, ""),
            }
        };

        let hash = unquote(hash.trim());
        if hash.is_empty() {
            return None;
        }
        Some(Self {
            password_hash: hash.to_string(),
            roles: split_tokens(rest),
        })
    }
}

/// Accounts and role permissions for the properties-backed realm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmSettings {
    pub users: IndexMap<String, UserDefinition>,
    pub roles: IndexMap<String, Vec<String>>,
}

impl RealmSettings {
    pub fn resolve(loader: &PropertiesLoader) -> Self {
        let mut users = IndexMap::new();
        for (key, value) in loader.keys_with_prefix(USERS_PREFIX) {
            let name = &key[USERS_PREFIX.len()..];
            if name.is_empty() {
                continue;
            }
            if let Some(user) = UserDefinition::parse(value) {
                users.insert(name.to_string(), user);
            }
        }

        let mut roles = IndexMap::new();
        for (key, value) in loader.keys_with_prefix(ROLES_PREFIX) {
            let role = &key[ROLES_PREFIX.len()..];
            if role.is_empty() {
                continue;
            }
            let permissions = split_tokens(value)
                .iter()
                .map(|p| unquote(p).to_string())
                .collect();
            roles.insert(role.to_string(), permissions);
        }

        Self { users, roles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(pairs: &[(&str, &str)]) -> ShiroSettings {
        ShiroSettings::resolve(&PropertiesLoader::from_pairs(pairs.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_when_absent() {
        let settings = resolve(&[]);

        assert!(settings.filter.filter_names.is_empty());
        assert_eq!(settings.filter.login_url, "/login");
        assert_eq!(settings.filter.success_url, "/");
        assert_eq!(settings.filter.unauthorized_url, "/403");
        assert_eq!(settings.filter.chain, FilterChainDefinitions::allow_all());

        assert_eq!(settings.redis.host, "127.0.0.1");
        assert_eq!(settings.redis.port, 6379);
        assert_eq!(settings.redis.password, None);
        assert_eq!(settings.redis.timeout, Duration::from_millis(360_000));
        assert_eq!(settings.redis.connection_timeout, Duration::from_millis(1_000));
        assert!(!settings.redis.is_cluster());

        assert_eq!(settings.session.cookie_name, "mySessionId");
        assert_eq!(settings.session.global_timeout, Duration::from_millis(360_000));
        assert!(settings.session.validation_scheduler_enabled);
        assert!(settings.session.session_id_cookie_enabled);
    }

    #[test]
    fn test_defaults_when_empty() {
        let settings = resolve(&[
            ("shiro.loginUrl", ""),
            ("shiro.successUrl", ""),
            ("shiro.unauthorizedUrl", ""),
            ("shiro.redis.host", ""),
            ("shiro.redis.port", ""),
            ("shiro.sessionid", ""),
        ]);
        assert_eq!(settings.filter.login_url, "/login");
        assert_eq!(settings.filter.success_url, "/");
        assert_eq!(settings.filter.unauthorized_url, "/403");
        assert_eq!(settings.redis.host, "127.0.0.1");
        assert_eq!(settings.redis.port, 6379);
        assert_eq!(settings.session.cookie_name, "mySessionId");
    }

    #[test]
    fn test_explicit_values() {
        let settings = resolve(&[
            ("shiro.filterClassNames", "com.example.AuditFilter, ,com.example.TraceFilter"),
            ("shiro.loginUrl", "/signin"),
            ("shiro.redis.host", "redis.internal"),
            ("shiro.redis.port", "7000"),
            ("shiro.redis.cluster.password", "s3cret"),
            ("shiro.redis.timeout", "2000"),
            ("shiro.redis.connectionTimeout", "500"),
            ("shiro.redis.cluster.address1", "10.0.0.1:7001"),
            ("shiro.sessionid", "SID"),
        ]);

        assert_eq!(
            settings.filter.filter_names,
            vec!["com.example.AuditFilter", "com.example.TraceFilter"]
        );
        assert_eq!(settings.filter.login_url, "/signin");
        assert_eq!(settings.redis.host, "redis.internal");
        assert_eq!(settings.redis.port, 7000);
        assert_eq!(settings.redis.password.as_deref(), Some("s3cret"));
        assert_eq!(settings.redis.timeout, Duration::from_millis(2000));
        assert_eq!(settings.redis.connection_timeout, Duration::from_millis(500));
        assert!(settings.redis.is_cluster());
        assert_eq!(settings.session.cookie_name, "SID");
    }

    #[test]
    fn test_pool_settings_are_fixed() {
        let pool = resolve(&[]).redis.pool;
        assert_eq!(pool.max_total, 1000);
        assert_eq!(pool.min_idle, 8);
        assert_eq!(pool.max_idle, 100);
        assert_eq!(pool.max_wait, None);
    }

    #[test]
    fn test_invalid_port() {
        for bad in ["0", "70000", "-1", "port"] {
            let loader = PropertiesLoader::from_pairs([("shiro.redis.port", bad)]);
            assert!(ShiroSettings::resolve(&loader).is_err(), "port {bad} accepted");
        }
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let loader = PropertiesLoader::from_pairs([("shiro.redis.timeout", "-5")]);
        let err = ShiroSettings::resolve(&loader).unwrap_err();
        assert!(err.to_string().contains("shiro.redis.timeout"));
    }

    #[test]
    fn test_user_definition_with_phc_hash() {
        let user = UserDefinition::parse(
            "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g, admin,staff",
        )
        .unwrap();
        assert_eq!(
            user.password_hash,
            "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g"
        );
        assert_eq!(user.roles, vec!["admin", "staff"]);

        let user = UserDefinition::parse("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA").unwrap();
        assert!(user.roles.is_empty());

        assert!(UserDefinition::parse("  ").is_none());
    }

    #[test]
    fn test_realm_accounts() {
        let settings = resolve(&[
            ("shiro.users.alice", "$argon2id$hash, admin, staff"),
            ("shiro.users.bob", "$argon2id$other"),
            ("shiro.roles.admin", "*"),
            ("shiro.roles.staff", "\"report:read,export\", user:view"),
        ]);

        let alice = &settings.realm.users["alice"];
        assert_eq!(alice.password_hash, "$argon2id$hash");
        assert_eq!(alice.roles, vec!["admin", "staff"]);
        assert!(settings.realm.users["bob"].roles.is_empty());

        assert_eq!(settings.realm.roles["admin"], vec!["*"]);
        assert_eq!(
            settings.realm.roles["staff"],
            vec!["report:read,export", "user:view"]
        );
    }
}
