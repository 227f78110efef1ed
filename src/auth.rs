// auth.rs — Authenticated principal deposited by the upstream gateway.
//
// Authentication itself happens upstream; the gateway strips any inbound
// identity headers and sets its own after verifying the caller. This module
// only reads them back. A request arriving without them bypassed the gateway
// and is rejected.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::DependencyError;

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_TENANT_ID: &str = "x-tenant-id";
pub const HEADER_ROLES: &str = "x-user-roles";
pub const HEADER_EMAIL: &str = "x-user-email";

/// Identity attached to every `/api/*` request. All tenant scoping flows
/// from `tenant_id`; nothing else in the service decides visibility.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub roles: Vec<String>,
    pub email: Option<String>,
}

fn header_uuid(parts: &Parts, name: &str) -> Option<Uuid> {
    parts
        .headers
        .get(name)?
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = DependencyError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_uuid(parts, HEADER_USER_ID).ok_or(DependencyError::Unauthorized)?;
        let tenant_id = header_uuid(parts, HEADER_TENANT_ID).ok_or(DependencyError::Unauthorized)?;
        let roles = parts
            .headers
            .get(HEADER_ROLES)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let email = parts
            .headers
            .get(HEADER_EMAIL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self {
            id,
            tenant_id,
            roles,
            email,
        })
    }
}
