//! Payment endpoints: creation, lookup, and the provider webhook.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::dtos::{
    PaymentDetailResponse, PaymentRequest, PaymentResponse, WebhookAck, WebhookNotification,
};
use crate::error::AppError;
use crate::AppState;

/// Create a payment.
///
/// POST /payments
#[tracing::instrument(
    skip(state, request),
    fields(payment_type = %request.payment_type_id, split = request.split_payment)
)]
pub async fn generate_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    let response = state.payments.generate_payment(request).await?;
    Ok((StatusCode::OK, Json(response)))
}

/// Look up a stored payment by its provider id.
///
/// GET /payments/:id
#[tracing::instrument(skip(state))]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentDetailResponse>, AppError> {
    let record = state
        .payments
        .find_payment(&id)
        .await?
        .ok_or(AppError::PaymentNotFound(id))?;

    Ok(Json(record.into()))
}

/// Provider webhook. MercadoPago retries on non-2xx responses, so failures
/// map to precise statuses instead of a blanket 200.
///
/// POST /payments/webhook
#[tracing::instrument(skip(state, notification))]
pub async fn webhook(
    State(state): State<AppState>,
    Json(notification): Json<WebhookNotification>,
) -> Result<Json<WebhookAck>, AppError> {
    let summary = state.reconciliation.reconcile(notification).await?;

    Ok(Json(WebhookAck {
        message: "Webhook processed successfully".to_string(),
        payment_id: summary.payment_id,
        status: summary.status,
    }))
}
