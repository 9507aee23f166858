//! Builds the security object graph from the properties file.
//!
//! Order: credentials matcher, realm, Redis client (or local fallback),
//! session id generator, session DAO, cookie, session manager, validation
//! scheduler, cache manager, security manager, filter. Background tasks are
//! started only once every component has been built.

use std::sync::Arc;

use daijie_auth::cache::{CacheManager, MemoryCacheManager};
use daijie_auth::credentials::TokenCredentialsMatcher;
use daijie_auth::filter::{AuthorizationGuard, FilterRegistry, ShiroFilter};
use daijie_auth::realm::{AuthorizingRealm, UserAuthorizingRealm};
use daijie_auth::security::SecurityManager;
use daijie_auth::session::{
    MemorySessionDao, SchedulerHandle, SessionCookie, SessionDao, SessionManager,
    SessionValidationScheduler, UuidSessionIdGenerator,
};
use daijie_auth::AuthError;
use daijie_auth_redis::{
    CacheInvalidationListener, RedisCacheManager, RedisManager, RedisSessionDao,
    create_redis_manager,
};
use daijie_config::{ConfigError, PropertiesLoader, ShiroSettings};
use tokio::task::JoinHandle;

use crate::config::SecurityConfig;
use crate::filters;

/// Permission needed to list active sessions.
pub const SESSION_READ_PERMISSION: &str = "session:read";

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("failed to load security properties from {path}: {source}")]
    Properties {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("invalid security settings: {0}")]
    Settings(#[from] ConfigError),

    #[error("security setup failed: {0}")]
    Security(#[from] AuthError),
}

/// Everything the HTTP layer needs, plus the background tasks to stop on shutdown.
pub struct SecurityComponents {
    pub settings: ShiroSettings,
    pub security: Arc<SecurityManager>,
    pub filter: Arc<ShiroFilter>,
    pub redis: Option<RedisManager>,
    /// Guards the session listing.
    pub session_guard: AuthorizationGuard,
    scheduler: Option<SchedulerHandle>,
    invalidation_listener: Option<JoinHandle<()>>,
}

impl SecurityComponents {
    pub fn session_store(&self) -> &'static str {
        if self.redis.is_some() { "redis" } else { "memory" }
    }

    pub fn is_validation_running(&self) -> bool {
        self.scheduler.as_ref().is_some_and(SchedulerHandle::is_running)
    }

    /// Stop the validation scheduler and the invalidation listener.
    pub async fn shutdown(self) {
        if let Some(scheduler) = self.scheduler {
            scheduler.stop().await;
        }
        if let Some(listener) = self.invalidation_listener {
            listener.abort();
        }
        tracing::info!("Security components stopped");
    }
}

/// Load the properties file named in `config` and assemble from it.
pub async fn assemble(config: &SecurityConfig) -> Result<SecurityComponents, AssemblyError> {
    let loader = PropertiesLoader::from_path(&config.properties_path)
        .map_err(|source| AssemblyError::Properties {
            path: config.properties_path.clone(),
            source,
        })?
        .with_env_overrides(config.env_overrides);

    tracing::info!(
        path = %config.properties_path,
        keys = loader.len(),
        "Security properties loaded"
    );
    assemble_with(&loader, config.redis_enabled, &filters::registry()).await
}

pub async fn assemble_with(
    loader: &PropertiesLoader,
    redis_enabled: bool,
    registry: &FilterRegistry,
) -> Result<SecurityComponents, AssemblyError> {
    let settings = ShiroSettings::resolve(loader)?;

    let matcher = Arc::new(TokenCredentialsMatcher::new());
    let realm = AuthorizingRealm::new(
        Arc::new(UserAuthorizingRealm::new(settings.realm.clone())),
        matcher,
    );

    let redis = if redis_enabled {
        create_redis_manager(&settings.redis).await
    } else {
        tracing::info!("Redis disabled, using local session storage and cache");
        None
    };

    let dao: Arc<dyn SessionDao> = match &redis {
        Some(redis) => Arc::new(RedisSessionDao::new(redis.clone())),
        None => Arc::new(MemorySessionDao::new()),
    };
    let cookie = SessionCookie::new(&settings.session.cookie_name);
    let sessions = SessionManager::new(
        dao,
        Arc::new(UuidSessionIdGenerator),
        cookie,
        &settings.session,
    );
    let scheduler = sessions
        .is_validation_scheduler_enabled()
        .then(|| SessionValidationScheduler::new(sessions.clone()));

    let (cache_manager, listener): (Arc<dyn CacheManager>, Option<CacheInvalidationListener>) =
        match &redis {
            Some(redis) => {
                let manager = RedisCacheManager::new(redis.clone());
                let listener = CacheInvalidationListener {
                    redis_urls: redis.pubsub_urls().to_vec(),
                    local_cache: Arc::clone(manager.local_cache()),
                };
                (Arc::new(manager), Some(listener))
            }
            None => (Arc::new(MemoryCacheManager::new()), None),
        };

    let security = Arc::new(SecurityManager::new(realm, sessions, cache_manager));
    let filter = Arc::new(ShiroFilter::from_settings(
        Arc::clone(&security),
        &settings.filter,
        registry,
    )?);
    let session_guard =
        AuthorizationGuard::permissions(Arc::clone(&security), [SESSION_READ_PERMISSION])?;

    tracing::info!(
        realm = %security.realm().name(),
        cache = security.cache_mode(),
        session_store = if redis.is_some() { "redis" } else { "memory" },
        cookie = %settings.session.cookie_name,
        "Security manager assembled"
    );

    Ok(SecurityComponents {
        settings,
        security,
        filter,
        redis,
        session_guard,
        scheduler: scheduler.map(SessionValidationScheduler::enable),
        invalidation_listener: listener.map(CacheInvalidationListener::start),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use daijie_auth::filter::Requirement;

    fn loader(pairs: &[(&str, &str)]) -> PropertiesLoader {
        PropertiesLoader::from_pairs(pairs.iter().copied())
    }

    #[tokio::test]
    async fn test_assembles_with_defaults() {
        let components = assemble_with(&loader(&[]), false, &filters::registry())
            .await
            .unwrap();

        assert_eq!(components.session_store(), "memory");
        assert_eq!(components.security.cache_mode(), "local");
        assert!(components.security.realm().has_authorization_cache());
        assert!(components.is_validation_running());
        assert_eq!(components.settings.filter.login_url, "/login");
        assert_eq!(components.security.sessions().cookie().name, "mySessionId");
        assert_eq!(
            components.session_guard.requirement(),
            &Requirement::Permissions(vec![SESSION_READ_PERMISSION.to_string()])
        );

        components.shutdown().await;
    }

    #[tokio::test]
    async fn test_configured_filters_are_installed() {
        let components = assemble_with(
            &loader(&[
                ("shiro.filterClassNames", filters::AUDIT_FILTER),
                ("shiro.filterChainDefinitions", "/admin/**=audit"),
                ("shiro.sessionid", "SID"),
            ]),
            false,
            &filters::registry(),
        )
        .await
        .unwrap();

        assert!(components.filter.filter_names().any(|n| n == "audit"));
        assert_eq!(components.security.sessions().cookie().name, "SID");
        components.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_filter_class_aborts() {
        let result = assemble_with(
            &loader(&[("shiro.filterClassNames", "com.example.Missing")]),
            false,
            &filters::registry(),
        )
        .await;
        assert!(matches!(result, Err(AssemblyError::Security(_))));
    }

    #[tokio::test]
    async fn test_malformed_chain_map_aborts() {
        let result = assemble_with(
            &loader(&[("shiro.filterChainDefinitionMap", "{not json")]),
            false,
            &filters::registry(),
        )
        .await;
        assert!(matches!(result, Err(AssemblyError::Settings(_))));
    }

    #[tokio::test]
    async fn test_missing_properties_file() {
        let config = SecurityConfig {
            properties_path: "/nonexistent/bootstrap.properties".into(),
            ..SecurityConfig::default()
        };
        let err = assemble(&config).await.err().unwrap();
        assert!(err.to_string().contains("/nonexistent/bootstrap.properties"));
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let components = assemble_with(
            &loader(&[
                ("shiro.redis.port", "1"),
                ("shiro.redis.timeout", "500"),
                ("shiro.redis.connectionTimeout", "200"),
            ]),
            true,
            &filters::registry(),
        )
        .await
        .unwrap();
        assert_eq!(components.session_store(), "memory");
        components.shutdown().await;
    }
}
