//! Application error type mapping to HTTP status codes.
//!
//! Every error body has the shape `{"error": message, "code": CODE}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use tenantflow_types::error::{EngineError, RepositoryError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors surfaced by the engine services.
    Engine(EngineError),
    /// Authentication failure.
    Unauthorized(String),
    /// Malformed request (bad id, bad JSON body).
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Engine(e.into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Engine(e @ EngineError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string())
            }
            AppError::Engine(e @ EngineError::NotFoundOrInactive(_)) => {
                (StatusCode::NOT_FOUND, "TRIGGER_NOT_FOUND", e.to_string())
            }
            AppError::Engine(EngineError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Engine(e @ EngineError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", e.to_string())
            }
            AppError::Engine(EngineError::Conflict(msg)) => {
                (StatusCode::CONFLICT, "CONFLICT", msg.clone())
            }
            AppError::Engine(e @ EngineError::StoreUnavailable(_)) => {
                tracing::error!(error = %e, "store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", e.to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = json!({
            "error": message,
            "code": code,
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: AppError) -> StatusCode {
        e.into_response().status()
    }

    #[test]
    fn test_engine_errors_map_to_status() {
        assert_eq!(
            status_of(EngineError::NotFound("execution x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::NotFoundOrInactive("t".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::Validation("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                EngineError::InvalidTransition {
                    from: "completed".into(),
                    action: "cancel".into()
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::Conflict("raced".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(RepositoryError::Connection.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(AppError::Unauthorized("no key".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_shape() {
        let (_, code, message) = AppError::Validation("steps must not be empty".into()).parts();
        assert_eq!(code, "VALIDATION_ERROR");
        assert_eq!(message, "steps must not be empty");
    }
}
