//! MercadoPago provider client.
//!
//! Covers the OAuth token endpoint (PKCE code exchange and refresh), the
//! Checkout Pro preference API, the Orders API for direct card charges, and
//! the payment status query used by webhook reconciliation.
//!
//! Every call takes the bearer token explicitly; the client holds no
//! credential state beyond the app's client id/secret.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

use crate::config::MercadoPagoConfig;
use crate::error::ProviderError;

/// MercadoPago API client.
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: Client,
    config: MercadoPagoConfig,
    timeout: Duration,
}

/// Token endpoint response, for both the authorization-code and the
/// refresh-token grants.
#[derive(Debug, Clone, Deserialize)]
pub struct OauthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Provider-side account id of the authorizing seller. Sent as a number
    /// by some API versions.
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    pub refresh_token: String,
    #[serde(default)]
    pub public_key: Option<String>,
}

/// Checkout preference creation request.
#[derive(Debug, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub payer: PreferencePayer,
    pub marketplace: String,
    /// Commission withheld by the marketplace. Omitted on direct payments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marketplace_fee: Option<f64>,
    pub metadata: HashMap<String, f64>,
    pub notification_url: String,
    pub back_urls: PreferenceBackUrls,
    pub auto_return: String,
}

#[derive(Debug, Serialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub quantity: u32,
    pub currency_id: String,
    pub unit_price: f64,
}

#[derive(Debug, Serialize)]
pub struct PreferencePayer {
    pub email: String,
    pub identification: Identification,
}

#[derive(Debug, Serialize)]
pub struct Identification {
    #[serde(rename = "type")]
    pub id_type: String,
    pub number: String,
}

#[derive(Debug, Serialize)]
pub struct PreferenceBackUrls {
    pub success: String,
    pub pending: String,
    pub failure: String,
}

#[derive(Debug, Deserialize)]
pub struct PreferenceResponse {
    pub id: String,
    #[serde(default)]
    pub operation_type: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub init_point: Option<String>,
}

/// Orders API request for direct card charges.
#[derive(Debug, Serialize)]
pub struct OrderRequest {
    #[serde(rename = "type")]
    pub order_type: String,
    pub external_reference: String,
    pub capture_mode: String,
    pub processing_mode: String,
    /// The Orders API takes amounts as decimal strings.
    pub total_amount: String,
    pub payer: OrderPayer,
    pub transactions: OrderTransactions,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize)]
pub struct OrderPayer {
    pub first_name: String,
    pub email: String,
    pub identification: Identification,
}

#[derive(Debug, Serialize)]
pub struct OrderTransactions {
    pub payments: Vec<OrderPaymentRequest>,
}

#[derive(Debug, Serialize)]
pub struct OrderPaymentRequest {
    pub amount: String,
    pub payment_method: OrderPaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct OrderPaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub token: String,
    pub installments: u32,
}

#[derive(Debug, Serialize)]
pub struct OrderItem {
    pub title: String,
    pub unit_price: String,
    pub quantity: u32,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_paid_amount: Option<f64>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub last_updated_date: Option<String>,
    #[serde(default)]
    pub transactions: Option<OrderResponseTransactions>,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponseTransactions {
    #[serde(default)]
    pub payments: Vec<OrderPaymentResult>,
}

#[derive(Debug, Deserialize)]
pub struct OrderPaymentResult {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub payment_method: Option<OrderPaymentMethodResult>,
}

#[derive(Debug, Deserialize)]
pub struct OrderPaymentMethodResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub method_type: Option<String>,
}

/// Payment status as returned by `GET /v1/payments/{id}`.
#[derive(Debug, Deserialize)]
pub struct ProviderPayment {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
}

/// MercadoPago API error body.
#[derive(Debug, Deserialize)]
struct MpApiError {
    message: String,
}

impl MercadoPagoClient {
    pub fn new(config: MercadoPagoConfig) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        Self {
            client: Client::new(),
            config,
            timeout,
        }
    }

    /// Build the seller authorization URL for the PKCE flow. The tenant id
    /// travels as the `state` parameter and comes back on the callback.
    pub fn authorization_url(
        &self,
        tenant_id: i64,
        code_challenge: &str,
    ) -> anyhow::Result<String> {
        let mut url = Url::parse(&self.config.auth_base_url)?;
        url.set_path("/authorization");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("platform_id", "mp")
            .append_pair("state", &tenant_id.to_string())
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url.to_string())
    }

    /// Exchange an authorization code for a token pair, closing the PKCE
    /// flow with the stored verifier.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OauthTokenResponse, ProviderError> {
        let url = format!("{}/oauth/token", self.config.api_base_url);
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, "oauth code exchange response");

        decode(status, &body, "oauth token")
    }

    /// Rotate an expired or near-expiry token pair with the refresh grant.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<OauthTokenResponse, ProviderError> {
        let url = format!("{}/oauth/token", self.config.api_base_url);
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, "oauth refresh response");

        decode(status, &body, "oauth token")
    }

    /// Create a Checkout Pro preference under the given bearer token.
    pub async fn create_preference(
        &self,
        access_token: &str,
        request: &PreferenceRequest,
    ) -> Result<PreferenceResponse, ProviderError> {
        let url = format!("{}/checkout/preferences", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, "create_preference response");

        decode(status, &body, "checkout preference")
    }

    /// Create an order for a direct card charge. `idempotency_key` guards
    /// against double charges on retried requests.
    pub async fn create_order(
        &self,
        access_token: &str,
        idempotency_key: &str,
        request: &OrderRequest,
    ) -> Result<OrderResponse, ProviderError> {
        let url = format!("{}/v1/orders", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(access_token)
            .header("X-Idempotency-Key", idempotency_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, "create_order response");

        decode(status, &body, "order")
    }

    /// Query the current status of a payment.
    pub async fn get_payment(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<ProviderPayment, ProviderError> {
        let url = format!("{}/v1/payments/{}", self.config.api_base_url, payment_id);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, payment_id = %payment_id, "get_payment response");

        decode(status, &body, "payment")
    }
}

fn decode<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
    what: &str,
) -> Result<T, ProviderError> {
    if status.is_success() {
        serde_json::from_str(body)
            .map_err(|e| ProviderError::Malformed(format!("{} response: {}", what, e)))
    } else {
        let message = serde_json::from_str::<MpApiError>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.to_string());
        tracing::error!(status = %status, message = %message, "MercadoPago API error");
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
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

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }))
}
