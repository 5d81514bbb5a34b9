//! HTTP error responses.
//!
//! Every service speaks the same error shape:
//! `{ "error": <code>, "message": <text> }`, plus a `details` array when
//! validation collected several violations. `AppError` maps to HTTP in
//! exactly one place, here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use registra_core::AppError;

/// Build a JSON error response with the platform's error shape.
pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "error": code, "message": message.into() })),
    )
        .into_response()
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Newtype so handlers can return `AppError` with `?`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match &err {
            AppError::Validation(violations) if violations.len() > 1 => (
                status,
                Json(json!({
                    "error": err.code(),
                    "message": "validation failed",
                    "details": violations,
                })),
            )
                .into_response(),
            AppError::Validation(violations) => {
                let message = violations.first().cloned().unwrap_or_default();
                json_error(status, err.code(), message)
            }
            // Internals are logged in full but never echoed to the client.
            AppError::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                json_error(status, err.code(), "internal server error")
            }
            other => json_error(status, other.code(), other.to_string()),
        }
    }
}
