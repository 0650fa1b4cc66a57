//! HTTP error type.
//!
//! Every handler returns [`WebResult`]; failures become a status code plus a
//! `{code, message}` JSON body. [`QueueError`] converts by taxonomy:
//! invalid requests are 400/422, conflicts 409, store outages 503.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ficket_core::QueueError;
use serde::Serialize;
use std::fmt;

/// Error returned by handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create an error with an explicit status and code.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), source: None }
    }

    /// Attach the underlying cause; logged for server errors, never sent.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// 404 Not Found for `resource` identified by `id`.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{resource} {id} not found"))
    }

    /// 409 Conflict.
    #[must_use]
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    /// 422 Unprocessable Entity.
    #[must_use]
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message)
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorBody { code: self.code, message: self.message };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        let code = queue_error_code(&err);
        let message = err.to_string();
        match err {
            QueueError::InvalidIdentifier { .. } => Self::new(StatusCode::BAD_REQUEST, code, message),
            QueueError::StoreUnavailable(_) => {
                Self::unavailable(code, "Store temporarily unavailable").with_source(anyhow::Error::new(err))
            }
            _ if err.is_invalid_request() => Self::validation(code, message),
            _ if err.is_conflict() => Self::conflict(code, message),
            _ => Self::internal("An internal error occurred").with_source(anyhow::Error::new(err)),
        }
    }
}

const fn queue_error_code(err: &QueueError) -> &'static str {
    match err {
        QueueError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
        QueueError::EmptySeatSelection => "EMPTY_SEAT_SELECTION",
        QueueError::SeatLimitExceeded { .. } => "SEAT_LIMIT_EXCEEDED",
        QueueError::SelectionAlreadyActive => "SELECTION_ALREADY_ACTIVE",
        QueueError::InvalidCapacity => "INVALID_CAPACITY",
        QueueError::SeatsHeldByOtherUser { .. } => "SEATS_HELD_BY_OTHER_USER",
        QueueError::SlotsStillActive { .. } => "SLOTS_STILL_ACTIVE",
        QueueError::LockBusy { .. } => "LOCK_BUSY",
        QueueError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        QueueError::Serialization(_) => "SERIALIZATION_ERROR",
        QueueError::NotificationUndeliverable { .. } => "NOTIFICATION_UNDELIVERABLE",
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ficket_core::{SeatMappingId, UserId};

    #[test]
    fn display_includes_code() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn not_found_names_resource() {
        let err = AppError::not_found("Seat lease", "A1");
        assert_eq!(err.to_string(), "[NOT_FOUND] Seat lease A1 not found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn queue_errors_map_by_taxonomy() {
        let invalid = AppError::from(QueueError::SeatLimitExceeded { requested: 5, limit: 4 });
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(invalid.code(), "SEAT_LIMIT_EXCEEDED");

        let identifier = AppError::from(SeatMappingId::parse("a b").unwrap_err());
        assert_eq!(identifier.status(), StatusCode::BAD_REQUEST);

        let conflict = AppError::from(QueueError::SlotsStillActive { active: 2 });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let outage = AppError::from(QueueError::StoreUnavailable("refused".into()));
        assert_eq!(outage.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(outage.to_string(), "[STORE_UNAVAILABLE] Store temporarily unavailable");
    }

    #[test]
    fn conflict_classification_decides_409() {
        let errors = [
            QueueError::EmptySeatSelection,
            QueueError::InvalidCapacity,
            QueueError::SeatsHeldByOtherUser { seats: vec![SeatMappingId::parse("A1").unwrap()] },
            QueueError::SlotsStillActive { active: 1 },
            QueueError::LockBusy { name: "queue-admin:e1".into() },
            QueueError::StoreUnavailable("refused".into()),
            QueueError::Serialization("bad json".into()),
            QueueError::NotificationUndeliverable { user: UserId::parse("u1").unwrap() },
        ];

        for err in errors {
            let conflict = err.is_conflict();
            let status = AppError::from(err).status();
            assert_eq!(status == StatusCode::CONFLICT, conflict, "status {status}");
        }

        let busy = AppError::from(QueueError::LockBusy { name: "queue-admin:e1".into() });
        assert_eq!(busy.code(), "LOCK_BUSY");
        let internal = AppError::from(QueueError::Serialization("bad json".into()));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.code(), "INTERNAL_SERVER_ERROR");
    }
}
