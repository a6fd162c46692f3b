//! Persistent domain model: tenant provider credentials and payment records.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Provider credential state for one tenant company.
///
/// Rows are seeded when a tenant is registered (outside this subsystem) and
/// are never deleted here; the authorization flow and refresh policy only
/// mutate the token material.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TenantCredential {
    /// Externally assigned tenant id, also used as the OAuth `state` value.
    #[serde(rename = "_id")]
    pub tenant_id: i64,
    /// Tenant display name.
    pub name: String,
    /// Provider-side account id, set after the first successful authorization.
    pub provider_account_id: Option<String>,
    /// Issued token material. `None` until authorization completes, so the
    /// access/refresh pair is always both-set or both-unset.
    pub oauth: Option<OauthTokens>,
    /// PKCE verifier of the most recent authorization attempt. Overwritten
    /// by every new attempt, cleared once the code exchange succeeds.
    pub pending_code_verifier: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl TenantCredential {
    pub fn new(tenant_id: i64, name: impl Into<String>) -> Self {
        let now = DateTime::now();
        Self {
            tenant_id,
            name: name.into(),
            provider_account_id: None,
            oauth: None,
            pending_code_verifier: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the tenant holds a usable token pair.
    pub fn is_authorized(&self) -> bool {
        self.oauth.is_some()
    }
}

/// Access/refresh token pair as issued by the provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OauthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds, as reported by the provider.
    pub expires_in: i64,
    /// When this pair was issued or last rotated.
    pub issued_at: DateTime,
    /// Provider public key for client-side operations, when reported.
    pub public_key: Option<String>,
}

impl OauthTokens {
    /// Whether the access token is expired at `now`, treating the last
    /// `margin_secs` of its lifetime as already expired.
    pub fn expired_by(&self, now: chrono::DateTime<chrono::Utc>, margin_secs: i64) -> bool {
        let usable = (self.expires_in - margin_secs).max(0);
        let deadline = self.issued_at.to_chrono() + chrono::Duration::seconds(usable);
        now >= deadline
    }
}

/// One payment attempt, keyed by the provider-issued id so webhook
/// notifications can correlate back to it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentRecord {
    #[serde(rename = "_id")]
    pub provider_payment_id: String,
    /// Provider-defined lifecycle state ("pending", "approved", ...).
    pub status: String,
    pub status_detail: String,
    pub description: String,
    /// Provider payment type (e.g. "credit_card", "regular_payment").
    pub modality: String,
    /// Provider payment method (e.g. "visa", "account_money").
    pub method: String,
    pub payer_email: String,
    pub payer_identification_type: String,
    pub payer_identification_number: String,
    pub total_amount: f64,
    /// Marketplace commission withheld; zero for non-split payments.
    pub commission: f64,
    /// `total_amount - commission`.
    pub net_amount: f64,
    pub currency: String,
    /// Provider creation timestamp, stored as reported.
    pub date_created: String,
    /// Provider approval timestamp, stored as reported.
    pub date_approved: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Closed set of payment modalities this broker can process.
///
/// Dispatch is resolved from this enum at compile time; there is no runtime
/// strategy registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentModality {
    AccountMoney,
    CreditCard,
    DebitCard,
}

/// Which processing strategy a modality maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    AccountBalance,
    Card,
}

impl PaymentModality {
    /// Case-insensitive parse of the request's payment type tag.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.to_ascii_lowercase().as_str() {
            "account_money" => Ok(PaymentModality::AccountMoney),
            "credit_card" => Ok(PaymentModality::CreditCard),
            "debit_card" => Ok(PaymentModality::DebitCard),
            _ => Err(AppError::UnsupportedModality(value.to_string())),
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        match self {
            PaymentModality::AccountMoney => StrategyKind::AccountBalance,
            PaymentModality::CreditCard | PaymentModality::DebitCard => StrategyKind::Card,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentModality::AccountMoney => "account_money",
            PaymentModality::CreditCard => "credit_card",
            PaymentModality::DebitCard => "debit_card",
        }
    }
}
