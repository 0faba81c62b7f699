//! Verified identity supplied by the fronting authentication gateway.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::application::error::AppError;
use crate::domain::types::UserId;

pub const VERIFIED_USER_HEADER: &str = "x-verified-user-id";

/// User id the gateway has already authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedUser(pub UserId);

impl<S> FromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(VERIFIED_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(|id| VerifiedUser(UserId(id)))
            .ok_or(AppError::Unauthorized)
    }
}
