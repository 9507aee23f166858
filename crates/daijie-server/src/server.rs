use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::get,
};
use daijie_auth::{ShiroFilter, require_authorization, security_filter};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    assembly::SecurityComponents,
    config::AppConfig,
    handlers::{self, AppState},
};

pub struct DaijieServer {
    addr: SocketAddr,
    app: Router,
    components: SecurityComponents,
}

/// Routes behind the security filter. Paths without a matching chain pass through.
pub fn build_app(cfg: &AppConfig, components: &SecurityComponents) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let state = AppState::from_components(components);
    let filter: Arc<ShiroFilter> = Arc::clone(&components.filter);

    let login_url = state.login_url.clone();
    let unauthorized_url = state.unauthorized_url.clone();

    let mut router = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/api/subject", get(handlers::current_subject))
        .route(
            "/api/sessions",
            get(handlers::active_sessions).route_layer(middleware::from_fn_with_state(
                components.session_guard.clone(),
                require_authorization,
            )),
        );
    if is_mountable(&login_url) {
        router = router.route(&login_url, get(handlers::login_form).post(handlers::login));
    } else {
        tracing::warn!(login_url = %login_url, "Login URL cannot be routed; login endpoint disabled");
    }
    if is_mountable(&unauthorized_url) && unauthorized_url != login_url {
        router = router.route(&unauthorized_url, get(handlers::unauthorized));
    }

    router
        .with_state(state)
        // Order: security filter -> cors/trace -> body limit
        .layer(middleware::from_fn_with_state(filter, security_filter))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

/// Absolute, literal, and not clashing with a fixed route.
fn is_mountable(url: &str) -> bool {
    url.starts_with('/')
        && !url.contains(['*', '?', '{', '}'])
        && !["/", "/healthz", "/readyz", "/api/subject", "/api/sessions"].contains(&url)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self, components: SecurityComponents) -> DaijieServer {
        let app = build_app(&self.config, &components);
        DaijieServer {
            addr: self.addr,
            app,
            components,
        }
    }
}

impl DaijieServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        self.components.shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
