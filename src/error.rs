//! Error taxonomy for the payment broker.
//!
//! Validation and tenant-lookup failures are detected before any provider
//! call and carry no side effects. Provider failures keep their transport
//! classification so callers can tell a retryable timeout from a permanent
//! rejection.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure talking to the payment provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,

    #[error("provider transport error: {0}")]
    Transport(reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Transport(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationErrors(#[from] validator::ValidationErrors),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Tenant {0} not found")]
    TenantNotFound(i64),

    #[error("Tenant {0} has not completed provider authorization")]
    TenantNotAuthorized(i64),

    #[error("No pending authorization for tenant {0}")]
    NoPendingAuthorization(i64),

    #[error("Payment {0} not found")]
    PaymentNotFound(String),

    #[error("Unsupported payment modality: {0}")]
    UnsupportedModality(String),

    #[error("Unsupported notification type: {0}")]
    UnsupportedNotification(String),

    #[error("Authorization code exchange failed")]
    AuthorizationExchange(#[source] ProviderError),

    #[error("Credential refresh failed")]
    Refresh(#[source] ProviderError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Persistence failure: {0}")]
    Persistence(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error_message, details) = match self {
            AppError::ValidationErrors(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::TenantNotFound(_) | AppError::PaymentNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string(), None)
            }
            AppError::TenantNotAuthorized(_) | AppError::NoPendingAuthorization(_) => {
                (StatusCode::CONFLICT, self.to_string(), None)
            }
            AppError::UnsupportedModality(_) | AppError::UnsupportedNotification(_) => {
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            AppError::AuthorizationExchange(err) => (
                StatusCode::BAD_GATEWAY,
                "Authorization code exchange failed".to_string(),
                Some(err.to_string()),
            ),
            AppError::Refresh(err) => (
                StatusCode::BAD_GATEWAY,
                "Credential refresh failed".to_string(),
                Some(err.to_string()),
            ),
            AppError::Provider(ProviderError::Timeout) => (
                StatusCode::GATEWAY_TIMEOUT,
                "Payment provider timed out".to_string(),
                None,
            ),
            AppError::Provider(err) => (
                StatusCode::BAD_GATEWAY,
                "Payment provider error".to_string(),
                Some(err.to_string()),
            ),
            AppError::Persistence(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Persistence failure".to_string(),
                Some(err.to_string()),
            ),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(err.to_string()),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}
