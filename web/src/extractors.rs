//! Request extractors.
//!
//! - [`UserIdentity`]: the caller, as asserted by the gateway in `X-User-Id`
//! - [`CorrelationId`]: the id assigned by the correlation middleware
//! - [`JsonBody`]: `Json` with rejections in the crate's error shape
//!
//! ```ignore
//! async fn handler(UserIdentity(user): UserIdentity, correlation: CorrelationId) -> WebResult<...> {
//!     tracing::info!(user_id = %user, correlation_id = %correlation.0, "Processing request");
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    Json, async_trait,
    extract::{FromRequest, FromRequestParts, Request, rejection::JsonRejection},
    http::request::Parts,
};
use ficket_core::UserId;
use uuid::Uuid;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Authenticated caller.
///
/// Authentication happens upstream; this service trusts the gateway-supplied
/// header. Missing is 401, malformed is 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("Missing {USER_ID_HEADER} header")))?
            .to_str()
            .map_err(|_| AppError::bad_request(format!("{USER_ID_HEADER} is not valid text")))?;

        Ok(Self(UserId::parse(raw)?))
    }
}

/// JSON body whose rejections use the `{code, message}` error shape.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::new(rejection.status(), "INVALID_BODY", rejection.body_text())),
        }
    }
}

/// Correlation ID for request tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(id.clone());
        }

        // Middleware not installed on this route.
        let id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

        Ok(Self(id))
    }
}
