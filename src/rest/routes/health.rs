// rest/routes/health.rs — Unauthenticated liveness probe.

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppContext;

pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "service": "depd",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": ctx.started_at.elapsed().as_secs(),
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
