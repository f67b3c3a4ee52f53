//! Principal resolution.
//!
//! Authentication happens upstream: the gateway in front of this service verifies the caller and
//! forwards its identity in two headers (HTTP) or metadata entries (gRPC).

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::principal::{Principal, Role};

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";

pub fn principal_from_values(id: Option<&str>, role: Option<&str>) -> Result<Principal, AppError> {
    let id = id
        .ok_or_else(|| AppError::Unauthenticated(format!("missing {PRINCIPAL_ID_HEADER}")))?;
    let role = role
        .ok_or_else(|| AppError::Unauthenticated(format!("missing {PRINCIPAL_ROLE_HEADER}")))?;

    let id = Uuid::parse_str(id.trim())
        .map_err(|err| AppError::Unauthenticated(format!("invalid principal id: {err}")))?;
    let role = role.parse::<Role>().map_err(AppError::Unauthenticated)?;

    Ok(Principal::new(id, role))
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_values(
            header_value(parts, PRINCIPAL_ID_HEADER),
            header_value(parts, PRINCIPAL_ROLE_HEADER),
        )
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
}
