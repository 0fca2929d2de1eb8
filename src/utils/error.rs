use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;
use crate::utils::response::error as error_response;

/// Caller-visible failures. Allocation failures never appear here; they are
/// recorded on the intent and reported through the query surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Not cancellable: intent is {0}")]
    NotCancellable(String),

    #[error("Storage error")]
    Store(#[from] StoreError),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unavailable(_) => StatusCode::CONFLICT,
            AppError::NotCancellable(_) => StatusCode::CONFLICT,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Unavailable(_) => "UNAVAILABLE",
            AppError::NotCancellable(_) => "NOT_CANCELLABLE",
            AppError::Store(_) => "INTERNAL",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    fn log(&self) {
        match self {
            AppError::Store(e) => {
                error!(error = ?e, "Storage error");
            }
            AppError::Internal(msg) => {
                error!(error = ?self, message = %msg, "Internal error");
            }
            _ => {
                tracing::debug!(error = ?self, "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Internal details stay in the logs
        let public_message = match &self {
            AppError::InvalidRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::Unavailable(msg) => msg.clone(),
            AppError::NotCancellable(status) => {
                format!("Intent can no longer be cancelled (status: {status})")
            }
            AppError::Store(_) | AppError::Internal(_) => "An internal error occurred".to_string(),
        };

        error_response(code, public_message, None, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_error_kinds() {
        assert_eq!(AppError::InvalidRequest("q".into()).code(), "INVALID_REQUEST");
        assert_eq!(AppError::NotFound("e".into()).code(), "NOT_FOUND");
        assert_eq!(AppError::Forbidden("s".into()).code(), "FORBIDDEN");
        assert_eq!(AppError::Unavailable("e".into()).code(), "UNAVAILABLE");
        assert_eq!(AppError::NotCancellable("COMPLETED".into()).code(), "NOT_CANCELLABLE");
        assert_eq!(AppError::Internal("x".into()).code(), "INTERNAL");
    }

    #[test]
    fn validation_maps_to_bad_request() {
        assert_eq!(
            AppError::InvalidRequest("quantity".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unavailable("sold out".into()).status_code(),
            StatusCode::CONFLICT
        );
    }
}
