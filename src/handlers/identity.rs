//! Caller identity as forwarded by the upstream gateway.

use std::future::{ready, Ready};
use std::str::FromStr;

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use uuid::Uuid;

use crate::domain::auth::{Actor, Role};
use crate::domain::errors::DomainError;
use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const ROLES_HEADER: &str = "X-User-Roles";

impl FromRequest for Actor {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req).map_err(AppError::from))
    }
}

fn actor_from_headers(req: &HttpRequest) -> Result<Actor, DomainError> {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(DomainError::Unauthorized)?;

    let roles = req
        .headers()
        .get(ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(DomainError::Unauthorized)?
        .split(',')
        .filter(|r| !r.trim().is_empty())
        .map(Role::from_str)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| DomainError::Unauthorized)?;

    if roles.is_empty() {
        return Err(DomainError::Unauthorized);
    }

    Ok(Actor::new(user_id, roles))
}
