//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use domain_invoicing::{InvoicingError, SignatureError};

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone())
            }
            ApiError::GatewayUnavailable(msg) => {
                (StatusCode::BAD_GATEWAY, "gateway_unavailable", msg.clone())
            }
            ApiError::Internal(msg) => {
                // Internals stay out of the response body
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<InvoicingError> for ApiError {
    fn from(err: InvoicingError) -> Self {
        match err {
            InvoicingError::NotFound(msg) => ApiError::NotFound(msg),
            InvoicingError::Validation(msg) => ApiError::Validation(msg),
            InvoicingError::Conflict { .. } | InvoicingError::IllegalTransition { .. } => {
                ApiError::Conflict(err.to_string())
            }
            InvoicingError::AlreadyExists(msg) => ApiError::Conflict(msg),
            InvoicingError::Gateway(gw) => ApiError::GatewayUnavailable(gw.to_string()),
            InvoicingError::InvariantViolation { .. } | InvoicingError::Storage(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<SignatureError> for ApiError {
    fn from(err: SignatureError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
