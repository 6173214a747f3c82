use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Token expired")]
    Expired,

    #[error("Token already used")]
    AlreadyUsed,

    #[error("Token is bound to another member")]
    MemberMismatch,

    #[error("Insufficient balance: {balance} available, {requested} requested")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Transient store failure: {0}")]
    TransientStoreFailure(String),

    #[error("Invariant violated: {0}")]
    Fatal(String),

    #[error("Database error")]
    DatabaseError(#[source] sqlx::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Expired => StatusCode::GONE,
            AppError::AlreadyUsed => StatusCode::CONFLICT,
            AppError::MemberMismatch => StatusCode::FORBIDDEN,
            AppError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SlotUnavailable(_) => StatusCode::CONFLICT,
            AppError::TransientStoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Expired => "TOKEN_EXPIRED",
            AppError::AlreadyUsed => "TOKEN_ALREADY_USED",
            AppError::MemberMismatch => "MEMBER_MISMATCH",
            AppError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AppError::SlotUnavailable(_) => "SLOT_UNAVAILABLE",
            AppError::TransientStoreFailure(_) => "TRANSIENT_STORE_FAILURE",
            AppError::Fatal(_) => "FATAL",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    /// Only transient store failures may be retried, and only for redemption.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientStoreFailure(_))
    }

    fn log(&self) {
        match self {
            AppError::Fatal(msg) => {
                error!(error = ?self, message = %msg, "Invariant violation");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::TransientStoreFailure(msg) => {
                warn!(message = %msg, "Transient store failure");
            }
            _ => {
                warn!(code = self.code(), message = %self, "Request rejected");
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => {
                AppError::TransientStoreFailure("store operation timed out".to_string())
            }
            StoreError::Contention(msg) => AppError::TransientStoreFailure(msg),
            StoreError::Invariant(msg) => AppError::Fatal(msg),
            StoreError::Overlap => {
                AppError::SlotUnavailable("overlaps an existing reservation".to_string())
            }
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::SlotUnavailable(msg) => msg.clone(),
            AppError::TransientStoreFailure(_) => {
                "The store is temporarily unavailable, retry the request".to_string()
            }
            AppError::Fatal(_) => "An internal error occurred".to_string(),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            other => other.to_string(),
        };

        let details = match &self {
            AppError::InsufficientBalance { balance, requested } => {
                Some(json!({ "balance": balance, "requested": requested }))
            }
            err if err.is_retryable() => Some(json!({ "retryable": true })),
            _ => None,
        };

        error_response(code, public_message, details, status)
    }
}
