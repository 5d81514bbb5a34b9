//! Application error taxonomy.
//!
//! One transport-agnostic error model shared by every service. Hooks and
//! services return these rather than throwing across service boundaries;
//! the API layer maps them to HTTP exactly once.

use thiserror::Error;

/// Result type used across the domain and service layers.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error.
///
/// Status convention: 400 validation/conflict, 401 credential failures,
/// 403 authenticated-but-denied, 404 not found, 429 throttled/rate-limited,
/// 502 upstream unreachable, 500 unexpected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Schema-level validation failed. Carries *all* violations, not just
    /// the first.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Missing, invalid, expired, or revoked credential.
    #[error("{0}")]
    Authentication(String),

    /// Authenticated but denied. Carries a human-readable denial reason.
    #[error("{0}")]
    Authorization(String),

    /// Uniqueness or referential-integrity violation.
    ///
    /// Surfaced as 400 alongside validation errors rather than a dedicated
    /// status; a known weakness kept for wire compatibility.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// Too many attempts inside the lock window.
    #[error("{0}")]
    Throttled(String),

    /// A dependency (Oracle, Token Service) was unreachable or timed out.
    /// Call sites must treat this as deny, never as allow.
    #[error("{0}")]
    Upstream(String),

    /// Unexpected failure. Logged in full; externally only a generic message.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn throttled(msg: impl Into<String>) -> Self {
        Self::Throttled(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Canonical HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => 400,
            AppError::Authentication(_) => 401,
            AppError::Authorization(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Throttled(_) => 429,
            AppError::Upstream(_) => 502,
            AppError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable error code for JSON responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Authentication(_) => "authentication_error",
            AppError::Authorization(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Throttled(_) => "rate_limited",
            AppError::Upstream(_) => "upstream_unreachable",
            AppError::Internal(_) => "internal_error",
        }
    }
}
