//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the shared state (origin target, upstream client, cache, analyzer)
//! - Create the Axum router with every endpoint
//! - Wire up middleware (request id, tracing, timeout, body limit, metrics)
//! - Serve until shutdown, then close the upstream client

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::analyzer::SiteAnalyzer;
use crate::cache::CacheStore;
use crate::config::ProxyConfig;
use crate::http::handlers;
use crate::http::rewrite::LinkRewriter;
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::upstream::{ProxyTarget, UpstreamClient, UpstreamResult};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub target: Arc<ProxyTarget>,
    pub upstream: Arc<UpstreamClient>,
    pub cache: CacheStore,
    pub cache_max_age: Duration,
    pub analyzer: SiteAnalyzer,
    pub rewriter: LinkRewriter,
}

impl AppState {
    /// Build every component from configuration. The upstream client is
    /// created here but connects lazily.
    pub fn from_config(config: &ProxyConfig) -> UpstreamResult<Self> {
        let target = Arc::new(ProxyTarget::from_config(&config.upstream)?);
        let upstream = Arc::new(UpstreamClient::new(target.clone()));
        let rewriter = LinkRewriter::new(target.path_prefix());

        Ok(Self {
            analyzer: SiteAnalyzer::new(upstream.clone(), config.analyzer.max_endpoints),
            cache: CacheStore::new(&config.cache.dir),
            cache_max_age: Duration::from_secs(config.cache.max_age_secs),
            rewriter,
            target,
            upstream,
        })
    }
}

fn request_span(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id
    )
}

/// HTTP server for the origin proxy.
pub struct HttpServer {
    router: Router,
    upstream: Arc<UpstreamClient>,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> UpstreamResult<Self> {
        let state = AppState::from_config(&config)?;
        let upstream = state.upstream.clone();
        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            upstream,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let proxy_route = get(handlers::proxy)
            .post(handlers::proxy)
            .put(handlers::proxy)
            .patch(handlers::proxy)
            .delete(handlers::proxy);
        let api_route = get(handlers::api).post(handlers::api);

        Router::new()
            .route("/", get(handlers::root))
            .route("/health", get(handlers::health))
            .route("/test", get(handlers::test_connection))
            // Wildcards never match an empty tail, so `/proxy/` is its own route.
            .route("/proxy", proxy_route.clone())
            .route("/proxy/", proxy_route.clone())
            .route("/proxy/{*path}", proxy_route)
            .route("/fetch", get(handlers::fetch))
            .route("/api", api_route.clone())
            .route("/api/", api_route.clone())
            .route("/api/{*path}", api_route)
            .route("/resource", get(handlers::resource))
            .route("/analyze", get(handlers::analyze))
            .route("/news", get(handlers::news))
            .route("/view", get(handlers::view))
            .route("/view/", get(handlers::view))
            .route("/view/{*path}", get(handlers::view))
            .route_layer(middleware::from_fn(metrics::track_requests))
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(request_span))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.listener.request_timeout_secs,
                    )))
                    .layer(DefaultBodyLimit::max(config.listener.max_body_bytes)),
            )
    }

    /// The router, for serving or driving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown_rx` fires, then drain
    /// in-flight requests and close the upstream client.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.base_url,
            "HTTP server starting"
        );

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await;

        self.upstream.close();
        tracing::info!("HTTP server stopped");
        result
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}
