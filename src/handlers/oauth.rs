//! Seller authorization endpoints for split payments.
//!
//! A tenant must complete this flow once before split payments can be
//! brokered on its behalf. The start endpoint hands back a provider URL for
//! the seller to visit; the provider redirects to the callback with an
//! authorization code.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};

use crate::dtos::{AuthorizeResponse, CallbackQuery};
use crate::error::AppError;
use crate::AppState;

/// Start the authorization flow for a registered tenant.
///
/// GET /oauth/start/:company_id
#[tracing::instrument(skip(state))]
pub async fn start(
    State(state): State<AppState>,
    Path(company_id): Path<i64>,
) -> Result<Json<AuthorizeResponse>, AppError> {
    let authorization_url = state.oauth.begin_authorization(company_id).await?;

    Ok(Json(AuthorizeResponse { authorization_url }))
}

/// Provider redirect target. `state` carries the tenant id the flow was
/// started for.
///
/// GET /oauth/callback
#[tracing::instrument(skip(state, query))]
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Value>, AppError> {
    state
        .oauth
        .complete_authorization(&query.code, &query.state)
        .await?;

    Ok(Json(json!({ "message": "Authorization completed" })))
}
