// rest/mod.rs — Public REST API server.
//
// Thin mapping of HTTP requests to the dependency service:
//   GET    /health                (no auth)
//   POST   /api/dependencies
//   GET    /api/dependencies/{id}
//   PUT    /api/dependencies/{id}
//   DELETE /api/dependencies/{id}
//   GET    /api/graph
//   GET    /api/critical-path
//   GET    /api/cycles

pub mod rate_limit;
pub mod routes;

use anyhow::Result;
use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::AppContext;
use rate_limit::RateLimiter;

pub async fn serve(
    ctx: Arc<AppContext>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.config.port));
    let router = build_router(ctx);

    info!("HTTP API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let limiter = Arc::new(RateLimiter::new(
        ctx.config.rate_limit_window_secs,
        ctx.config.rate_limit_max_requests,
    ));

    let api = Router::new()
        .route(
            "/api/dependencies",
            axum::routing::post(routes::dependencies::create),
        )
        .route(
            "/api/dependencies/{id}",
            get(routes::dependencies::get_by_id)
                .put(routes::dependencies::update)
                .delete(routes::dependencies::delete),
        )
        .route("/api/graph", get(routes::graph::get_graph))
        .route("/api/critical-path", get(routes::graph::get_critical_path))
        .route("/api/cycles", get(routes::graph::get_cycles))
        .layer(middleware::from_fn_with_state(limiter, rate_limit::enforce));

    Router::new()
        // Health (no auth, no rate limit)
        .route("/health", get(routes::health::health))
        .merge(api)
        .layer(cors_layer(&ctx.config.cors_origins))
        .with_state(ctx)
}

/// Success envelope shared by every endpoint.
pub(crate) fn ok(data: impl Serialize) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}
