// error.rs — Domain error taxonomy and its HTTP mapping.
//
// Domain errors are raised at the point of detection and travel unmodified
// to the REST boundary, where `IntoResponse` classifies them into the stable
// surface codes. Store and bus failures are not recovered locally; they
// surface as INTERNAL_ERROR with details logged server-side.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use chrono::Utc;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("missing required fields: {}", .fields.join(", "))]
    MissingRequiredFields { fields: Vec<String> },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("work items not found: {}", join_ids(.missing))]
    WorkItemsNotFound { missing: Vec<Uuid> },

    #[error("dependency not found: {0}")]
    NotFound(Uuid),

    #[error("dependency from {from_id} to {to_id} already exists")]
    Duplicate { from_id: Uuid, to_id: Uuid },

    #[error("dependency would create a cycle: {}", format_chain(.chain))]
    CycleDetected { chain: Vec<Uuid> },

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("authenticated principal missing from request")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Render a node chain as `a → b → c` for error messages and suggestions.
pub fn format_chain(chain: &[Uuid]) -> String {
    chain
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(" → ")
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl DependencyError {
    /// Stable machine-readable code, identical across reimplementations.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRequiredFields { .. } => "MISSING_REQUIRED_FIELDS",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::WorkItemsNotFound { .. } => "WORK_ITEMS_NOT_FOUND",
            Self::NotFound(_) => "DEPENDENCY_NOT_FOUND",
            Self::Duplicate { .. } => "DUPLICATE_DEPENDENCY",
            Self::CycleDetected { .. } => "CYCLE_DETECTED",
            Self::RateLimited => "RATE_LIMIT_EXCEEDED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingRequiredFields { .. }
            | Self::InvalidRequest(_)
            | Self::WorkItemsNotFound { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Duplicate { .. } | Self::CycleDetected { .. } => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DependencyError {
    fn into_response(self) -> Response {
        // Internal failure details stay in the server log; the client only
        // sees the generic code.
        let message = match &self {
            Self::Internal(e) => {
                error!(err = %e, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "success": false,
            "error": self.code(),
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        });
        (self.status(), Json(body)).into_response()
    }
}
