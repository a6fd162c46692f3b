//! HTTP surface: health and metrics here, payments and seller
//! authorization in their own modules.

pub mod oauth;
pub mod payments;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "payment-broker",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Prometheus text exposition of the broker counters.
pub async fn metrics() -> impl IntoResponse {
    crate::services::metrics::get_metrics()
}
