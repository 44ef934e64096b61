pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limit;

use crate::config::LimiterConfig;
use crate::error::{LimiterError, Result};
use crate::metrics::{metrics_handler, MetricsService};
use crate::rate_limit::{
    rate_limit_middleware, MemoryStore, RateLimitExceeded, RateLimiter, RedisStore, WindowStore,
};
use axum::{
    extract::Request,
    middleware,
    routing::get,
    Json, Router as AxumRouter,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Initialize the rate limited server
pub async fn init_server(config: LimiterConfig) -> Result<()> {
    // Validate configuration
    config.validate()?;

    info!("Starting rate limiter service");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    let limiter = Arc::new(build_limiter(&config).await?);

    let metrics = if config.metrics.enabled {
        Some(MetricsService::new()?)
    } else {
        None
    };

    let app = build_app(limiter, metrics);

    // Bind and serve
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(LimiterError::Io)?;

    info!("Rate limiter ready to accept connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| LimiterError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Build the window store and limiter described by the configuration.
///
/// Falls back to an in-memory store when Redis does not answer a ping.
pub async fn build_limiter(config: &LimiterConfig) -> Result<RateLimiter> {
    let store: Arc<dyn WindowStore> = match &config.store.redis_url {
        Some(url) => {
            info!("Initializing rate limiter with Redis backend");
            let redis = RedisStore::new(url).await?;
            match redis.ping().await {
                Ok(()) => {
                    info!("Redis connection successful, using Redis window store");
                    Arc::new(redis)
                }
                Err(e) => {
                    warn!("Redis ping failed: {}, falling back to memory store", e);
                    Arc::new(MemoryStore::new())
                }
            }
        }
        None => {
            info!("Initializing rate limiter with memory store");
            Arc::new(MemoryStore::new())
        }
    };

    RateLimiter::new(
        config.limiter.namespace.clone(),
        config.limiter.to_options(),
        store,
    )
}

/// Assemble the HTTP application: every route except `/metrics` is rate limited
pub fn build_app(limiter: Arc<RateLimiter>, metrics: Option<MetricsService>) -> AxumRouter {
    let limited = AxumRouter::new()
        .fallback(echo_handler)
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    let mut app = AxumRouter::new();
    if let Some(metrics) = metrics {
        app = app.route("/metrics", get(metrics_handler).with_state(metrics));
    }

    app.merge(limited).layer(TraceLayer::new_for_http())
}

/// Echo the request line back to the caller
async fn echo_handler(request: Request) -> Json<Value> {
    Json(json!({
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "rate_limited": request.extensions().get::<RateLimitExceeded>().is_some(),
    }))
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "window_limiter=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
