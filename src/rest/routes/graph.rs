// rest/routes/graph.rs — Graph, critical-path, and cycle read routes.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::DependencyError;
use crate::rest::ok;
use crate::AppContext;

#[derive(Deserialize)]
pub struct GraphQuery {
    /// Comma-separated work item ids restricting the graph.
    pub work_item_ids: Option<String>,
}

fn parse_filter(raw: &str) -> Result<Vec<Uuid>, DependencyError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s).map_err(|_| {
                DependencyError::InvalidRequest(format!("work_item_ids contains an invalid uuid: {s}"))
            })
        })
        .collect()
}

pub async fn get_graph(
    State(ctx): State<Arc<AppContext>>,
    principal: Principal,
    Query(query): Query<GraphQuery>,
) -> Result<Json<Value>, DependencyError> {
    let filter = query
        .work_item_ids
        .as_deref()
        .map(parse_filter)
        .transpose()?;
    let payload = ctx.deps.graph(&principal, filter).await?;
    Ok(ok(payload))
}

pub async fn get_critical_path(
    State(ctx): State<Arc<AppContext>>,
    principal: Principal,
) -> Result<Json<Value>, DependencyError> {
    let payload = ctx.deps.critical_path(&principal).await?;
    Ok(ok(payload))
}

pub async fn get_cycles(
    State(ctx): State<Arc<AppContext>>,
    principal: Principal,
) -> Result<Json<Value>, DependencyError> {
    let report = ctx.deps.cycles(&principal).await?;
    Ok(ok(report))
}
