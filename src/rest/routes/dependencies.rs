// rest/routes/dependencies.rs — Edge CRUD routes.
//
// Body fields arrive as optional strings so that absence and malformation
// map onto distinct error codes (MISSING_REQUIRED_FIELDS vs INVALID_REQUEST)
// instead of a generic deserialisation failure.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::Principal;
use crate::dependencies::{CreateEdgeInput, EdgePatch};
use crate::error::DependencyError;
use crate::graph::DependencyType;
use crate::rest::ok;
use crate::AppContext;

#[derive(Deserialize)]
pub struct CreateDependencyRequest {
    pub from_id: Option<String>,
    pub to_id: Option<String>,
    pub dependency_type: Option<String>,
    pub lag_days: Option<i64>,
    pub metadata: Option<Value>,
}

#[derive(Deserialize)]
pub struct UpdateDependencyRequest {
    pub dependency_type: Option<String>,
    pub lag_days: Option<i64>,
    pub metadata: Option<Value>,
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DependencyError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| DependencyError::InvalidRequest(format!("{field} is not a valid uuid: {value}")))
}

fn parse_dependency_type(value: &str) -> Result<DependencyType, DependencyError> {
    value
        .parse()
        .map_err(|_| DependencyError::InvalidRequest(format!("unknown dependency type: {value}")))
}

fn parse_lag(value: i64) -> Result<i32, DependencyError> {
    i32::try_from(value)
        .map_err(|_| DependencyError::InvalidRequest(format!("lag_days out of range: {value}")))
}

pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    principal: Principal,
    Json(body): Json<CreateDependencyRequest>,
) -> Result<(StatusCode, Json<Value>), DependencyError> {
    let mut missing = Vec::new();
    for (name, present) in [
        ("from_id", body.from_id.is_some()),
        ("to_id", body.to_id.is_some()),
        ("dependency_type", body.dependency_type.is_some()),
    ] {
        if !present {
            missing.push(name.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(DependencyError::MissingRequiredFields { fields: missing });
    }

    let input = CreateEdgeInput {
        from_id: parse_uuid("from_id", body.from_id.as_deref().unwrap_or_default())?,
        to_id: parse_uuid("to_id", body.to_id.as_deref().unwrap_or_default())?,
        dependency_type: parse_dependency_type(body.dependency_type.as_deref().unwrap_or_default())?,
        lag_days: parse_lag(body.lag_days.unwrap_or(0))?,
        metadata: body.metadata.unwrap_or_else(|| json!({})),
    };
    let edge = ctx.deps.create(&principal, input).await?;
    Ok((StatusCode::CREATED, ok(edge)))
}

pub async fn get_by_id(
    State(ctx): State<Arc<AppContext>>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, DependencyError> {
    let edge = ctx.deps.get(&principal, id).await?;
    Ok(ok(edge))
}

pub async fn update(
    State(ctx): State<Arc<AppContext>>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateDependencyRequest>,
) -> Result<Json<Value>, DependencyError> {
    let patch = EdgePatch {
        dependency_type: body
            .dependency_type
            .as_deref()
            .map(parse_dependency_type)
            .transpose()?,
        lag_days: body.lag_days.map(parse_lag).transpose()?,
        metadata: body.metadata,
    };
    let edge = ctx.deps.update(&principal, id, patch).await?;
    Ok(ok(edge))
}

pub async fn delete(
    State(ctx): State<Arc<AppContext>>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, DependencyError> {
    ctx.deps.delete(&principal, id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "dependency deleted",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
