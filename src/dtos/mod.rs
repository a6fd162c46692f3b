//! Wire-level request/response types.
//!
//! Payment DTOs use camelCase field names, matching the contract the
//! storefront clients already speak.

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::models::PaymentRecord;

/// Request to create a payment.
#[derive(Debug, Deserialize, Validate, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Payment modality tag, e.g. "credit_card" or "account_money".
    #[validate(length(min = 1, message = "Payment type is required"))]
    pub payment_type_id: String,
    /// Concrete method within the modality, e.g. "visa" or "account_money".
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method_id: String,
    #[validate(range(min = 0.0, message = "Amount must not be negative"))]
    pub total_amount: f64,
    /// Required for account-balance payments; ignored elsewhere.
    #[serde(default)]
    pub currency_id: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Payer name is required"))]
    pub payer_name: String,
    #[validate(nested)]
    pub payer: PayerRequest,
    /// When true the payment is brokered on behalf of a tenant and a
    /// commission is withheld.
    #[serde(default)]
    pub split_payment: bool,
    /// Tenant id; required when `split_payment` is set.
    pub company_id: Option<i64>,
    /// Card token from the client-side tokenizer. Card modalities only.
    pub token: Option<String>,
    pub installments: Option<u32>,
    pub issuer_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PayerRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(nested)]
    pub identification: IdentificationRequest,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct IdentificationRequest {
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "Identification type is required"))]
    pub id_type: String,
    #[validate(length(min = 1, message = "Identification number is required"))]
    pub number: String,
}

/// Response after brokering a payment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    /// Provider-issued payment or preference id.
    pub id: String,
    pub description: String,
    pub status: String,
    pub status_detail: String,
    pub payment_method_id: String,
    pub payment_type_id: String,
    pub transaction_amount: f64,
}

/// Stored payment projection returned by the lookup endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetailResponse {
    pub id: String,
    pub status: String,
    pub status_detail: String,
    pub description: String,
    pub payment_type_id: String,
    pub payment_method_id: String,
    pub payer_email: String,
    pub total_amount: f64,
    pub commission: f64,
    pub net_amount: f64,
    pub currency: String,
    pub date_created: String,
    pub date_approved: String,
}

impl From<PaymentRecord> for PaymentDetailResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            id: record.provider_payment_id,
            status: record.status,
            status_detail: record.status_detail,
            description: record.description,
            payment_type_id: record.modality,
            payment_method_id: record.method,
            payer_email: record.payer_email,
            total_amount: record.total_amount,
            commission: record.commission,
            net_amount: record.net_amount,
            currency: record.currency,
            date_created: record.date_created,
            date_approved: record.date_approved,
        }
    }
}

/// Provider webhook notification. The provider sends `data.id` as either a
/// JSON string or a number depending on the event source, so it is
/// normalized to a string here.
#[derive(Debug, Deserialize)]
pub struct WebhookNotification {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub data: Option<WebhookData>,
}

#[derive(Debug, Deserialize, Default)]
pub struct WebhookData {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

/// Acknowledgement returned to the provider after a webhook is processed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub message: String,
    pub payment_id: i64,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub authorization_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}
