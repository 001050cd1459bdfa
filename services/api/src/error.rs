//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and its
//! mapping onto HTTP responses. Engine outcomes keep their specific,
//! actionable messages; everything internal collapses to a logged 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use consult_core::EngineError;
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A typed outcome that propagated up from the booking engine.
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// The caller is authenticated but not allowed to do this.
    #[error("{0}")]
    Forbidden(String),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Engine(engine) => {
                let status = match engine {
                    EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                    EngineError::RuleOverlap
                    | EngineError::DuplicateBlock
                    | EngineError::SlotUnavailable
                    | EngineError::NotEligible(_)
                    | EngineError::NotCancellable(_) => StatusCode::CONFLICT,
                    EngineError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
                    EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                    EngineError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!("Storage error reached a handler: {engine}");
                    (status, "An internal error occurred".to_string())
                } else {
                    (status, engine.to_string())
                }
            }
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message.clone()),
            other => {
                error!("Unhandled API error: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn engine_outcomes_map_to_specific_statuses() {
        assert_eq!(
            status_of(EngineError::Validation("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::SlotUnavailable.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::InsufficientFunds { shortfall: dec!(12.50) }.into()),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(EngineError::NotFound("booking".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::StorageUnavailable("down".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn internal_errors_never_leak_details() {
        let response = ApiError::Internal("secret connection string".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
