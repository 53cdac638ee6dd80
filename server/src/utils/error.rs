use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Order '{0}' has already been issued")]
    DuplicateOrder(String),

    #[error("Persistence failure for order '{order_id}'")]
    PersistenceFailure {
        order_id: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Malformed ticket code")]
    MalformedCode,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Payment checksum mismatch for order '{0}'")]
    ChecksumMismatch(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Ticket rendering failed: {0}")]
    Rendering(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingParameter(_)
            | AppError::InvalidParameter(_)
            | AppError::InvalidAmount(_)
            | AppError::MalformedCode => StatusCode::BAD_REQUEST,
            AppError::ChecksumMismatch(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateOrder(_) | AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::PersistenceFailure { .. } | AppError::Database(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Rendering(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingParameter(_) => "MISSING_PARAMETER",
            AppError::InvalidParameter(_) => "INVALID_PARAMETER",
            AppError::InvalidAmount(_) => "INVALID_AMOUNT",
            AppError::DuplicateOrder(_) => "DUPLICATE_ORDER",
            AppError::PersistenceFailure { .. } => "PERSISTENCE_FAILURE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::MalformedCode => "MALFORMED_CODE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ChecksumMismatch(_) => "CHECKSUM_MISMATCH",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Rendering(_) => "RENDERING_ERROR",
            AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Store-level failures may be retried by the caller. Order creation is
    /// safe to retry because a replay surfaces as `DuplicateOrder`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::PersistenceFailure { .. } | AppError::Database(_)
        )
    }

    /// Attach the order id to a bare database error so the caller can retry
    /// the exact same issuance.
    pub fn for_order(self, order_id: &str) -> Self {
        match self {
            AppError::Database(source) => AppError::PersistenceFailure {
                order_id: order_id.to_string(),
                source,
            },
            other => other,
        }
    }

    fn log(&self) {
        match self {
            AppError::MissingParameter(msg)
            | AppError::InvalidParameter(msg)
            | AppError::InvalidAmount(msg)
            | AppError::DuplicateOrder(msg)
            | AppError::NotFound(msg)
            | AppError::ChecksumMismatch(msg)
            | AppError::InvalidState(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::MalformedCode => {
                warn!(code = self.code(), "Request rejected");
            }
            AppError::PersistenceFailure { order_id, source } => {
                error!(order_id = %order_id, error = ?source, "Persistence failure");
            }
            AppError::Database(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::Rendering(msg) | AppError::Internal(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        let public_message = match &self {
            AppError::MissingParameter(_)
            | AppError::InvalidParameter(_)
            | AppError::InvalidAmount(_)
            | AppError::DuplicateOrder(_)
            | AppError::MalformedCode
            | AppError::NotFound(_)
            | AppError::ChecksumMismatch(_)
            | AppError::InvalidState(_) => self.to_string(),
            AppError::PersistenceFailure { order_id, .. } => {
                format!("Order '{}' could not be stored, please retry", order_id)
            }
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Rendering(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        };

        let details = match &self {
            AppError::PersistenceFailure { order_id, .. } => {
                Some(json!({ "order_id": order_id, "retryable": true }))
            }
            AppError::Database(_) => Some(json!({ "retryable": true })),
            _ => None,
        };

        error_response(code, public_message, details, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_failures_are_retryable() {
        let persistence = AppError::Database(sqlx::Error::PoolTimedOut).for_order("ORD-1");
        assert!(persistence.is_retryable());
        assert_eq!(persistence.code(), "PERSISTENCE_FAILURE");

        assert!(!AppError::DuplicateOrder("ORD-1".into()).is_retryable());
        assert!(!AppError::MalformedCode.is_retryable());
        assert!(!AppError::InvalidAmount("0".into()).is_retryable());
    }

    #[test]
    fn test_for_order_keeps_domain_errors() {
        let err = AppError::DuplicateOrder("ORD-1".into()).for_order("ORD-1");
        assert!(matches!(err, AppError::DuplicateOrder(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::MissingParameter("phone".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidParameter("from".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::InvalidParameter("from".into()).code(), "INVALID_PARAMETER");
        assert_eq!(
            AppError::DuplicateOrder("ORD-1".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::ChecksumMismatch("ORD-1".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
