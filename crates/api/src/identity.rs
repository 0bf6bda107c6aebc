//! Caller identity, as asserted by the fronting identity provider.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::Actor;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated actor behind a request.
///
/// `X-User-Id` must be a positive integer. `X-User-Role: admin` grants the
/// admin role; any other role, or none, is a plain customer.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Actor);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(UserId::new)
            .ok_or_else(|| ApiError::Unauthorized("Missing or invalid user identity".to_string()))?;

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

        let actor = if is_admin {
            Actor::admin(user_id)
        } else {
            Actor::customer(user_id)
        };
        Ok(Self(actor))
    }
}
