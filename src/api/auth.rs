use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::response::ApiError;

/// Header carrying the caller's identity, set by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller. Routes that extract this reject anonymous
/// requests with 401 before any handler logic runs.
#[derive(Debug, Clone)]
pub struct OwnerId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, ApiError> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| OwnerId(value.to_string()))
            .ok_or_else(|| ApiError::unauthorized(format!("Missing {USER_ID_HEADER} header")))
    }
}
