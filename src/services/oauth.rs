//! Seller authorization flow and credential refresh policy.
//!
//! Authorization uses the OAuth 2.0 authorization-code grant with PKCE: a
//! verifier is stored per tenant when the flow starts and consumed when the
//! provider calls back. Refresh is time-based: a token is rotated once it is
//! inside a safety margin of its expiry.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use mongodb::bson::DateTime;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::{OauthTokens, TenantCredential};
use crate::services::mercadopago::MercadoPagoClient;
use crate::services::repository::CredentialStore;
use crate::utils::{derive_code_challenge, generate_code_verifier};

/// Tokens this close to expiry are treated as already expired, so a payment
/// never goes out with a token that dies mid-flight.
pub const REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Clone)]
pub struct OauthService {
    credentials: Arc<dyn CredentialStore>,
    provider: MercadoPagoClient,
    /// Per-tenant guards serializing credential mutation. Concurrent flows
    /// for different tenants proceed in parallel.
    flow_guards: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl OauthService {
    pub fn new(credentials: Arc<dyn CredentialStore>, provider: MercadoPagoClient) -> Self {
        Self {
            credentials,
            provider,
            flow_guards: Arc::new(DashMap::new()),
        }
    }

    fn tenant_guard(&self, tenant_id: i64) -> Arc<Mutex<()>> {
        self.flow_guards
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start an authorization flow for a tenant: generate a fresh PKCE pair,
    /// store the verifier (replacing any earlier attempt), and return the
    /// provider URL the seller must visit.
    pub async fn begin_authorization(&self, tenant_id: i64) -> Result<String, AppError> {
        let guard = self.tenant_guard(tenant_id);
        let _lock = guard.lock().await;

        self.credentials
            .find(tenant_id)
            .await
            .map_err(AppError::Persistence)?
            .ok_or(AppError::TenantNotFound(tenant_id))?;

        let verifier = generate_code_verifier();
        let challenge = derive_code_challenge(&verifier);

        self.credentials
            .save_pending_verifier(tenant_id, &verifier)
            .await
            .map_err(AppError::Persistence)?;

        let url = self.provider.authorization_url(tenant_id, &challenge)?;

        tracing::info!(tenant_id = tenant_id, "Authorization flow started");
        Ok(url)
    }

    /// Complete the flow from the provider callback. `state` carries the
    /// tenant id that went out with the authorization URL.
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<(), AppError> {
        let tenant_id: i64 = state
            .parse()
            .map_err(|_| AppError::Validation(format!("Invalid state parameter: {}", state)))?;

        let guard = self.tenant_guard(tenant_id);
        let _lock = guard.lock().await;

        let credential = self
            .credentials
            .find(tenant_id)
            .await
            .map_err(AppError::Persistence)?
            .ok_or(AppError::TenantNotFound(tenant_id))?;

        let verifier = credential
            .pending_code_verifier
            .ok_or(AppError::NoPendingAuthorization(tenant_id))?;

        let issued = self
            .provider
            .exchange_code(code, &verifier)
            .await
            .map_err(AppError::AuthorizationExchange)?;

        let tokens = OauthTokens {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            expires_in: issued.expires_in,
            issued_at: DateTime::now(),
            public_key: issued.public_key,
        };

        self.credentials
            .save_tokens(tenant_id, &tokens, issued.user_id.as_deref())
            .await
            .map_err(AppError::Persistence)?;

        tracing::info!(
            tenant_id = tenant_id,
            provider_account_id = ?issued.user_id,
            "Tenant authorization completed"
        );
        Ok(())
    }

    /// Return the tenant credential with a usable access token, rotating the
    /// pair first when it is expired or inside the refresh margin. A failed
    /// rotation leaves the stored pair untouched.
    pub async fn ensure_fresh(&self, tenant_id: i64) -> Result<TenantCredential, AppError> {
        let guard = self.tenant_guard(tenant_id);
        let _lock = guard.lock().await;

        let mut credential = self
            .credentials
            .find(tenant_id)
            .await
            .map_err(AppError::Persistence)?
            .ok_or(AppError::TenantNotFound(tenant_id))?;

        let tokens = credential
            .oauth
            .as_ref()
            .ok_or(AppError::TenantNotAuthorized(tenant_id))?;

        if !tokens.expired_by(Utc::now(), REFRESH_MARGIN_SECS) {
            return Ok(credential);
        }

        let refreshed = self
            .provider
            .refresh_access_token(&tokens.refresh_token)
            .await
            .map_err(AppError::Refresh)?;

        let rotated = OauthTokens {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_in: refreshed.expires_in,
            issued_at: DateTime::now(),
            public_key: refreshed.public_key.or_else(|| tokens.public_key.clone()),
        };

        self.credentials
            .save_tokens(tenant_id, &rotated, refreshed.user_id.as_deref())
            .await
            .map_err(AppError::Persistence)?;

        tracing::info!(tenant_id = tenant_id, "Access token rotated");

        credential.oauth = Some(rotated);
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{BackUrls, MercadoPagoConfig};
    use crate::services::memory::InMemoryCredentialStore;

    fn provider_config(api_base_url: &str) -> MercadoPagoConfig {
        MercadoPagoConfig {
            client_id: "8973882513782".to_string(),
            client_secret: Secret::new("client-secret".to_string()),
            access_token: Secret::new("APP_USR-platform".to_string()),
            redirect_uri: "https://broker.example.com/oauth/callback".to_string(),
            auth_base_url: "https://auth.mercadopago.com".to_string(),
            api_base_url: api_base_url.to_string(),
            notification_url: "https://broker.example.com/payments/webhook".to_string(),
            marketplace: "MP-MARKETPLACE".to_string(),
            back_urls: BackUrls {
                success: "https://http.cat/200".to_string(),
                pending: "https://http.cat/102".to_string(),
                failure: "https://http.cat/500".to_string(),
            },
            request_timeout_secs: 5,
        }
    }

    fn service_with(
        store: Arc<InMemoryCredentialStore>,
        api_base_url: &str,
    ) -> OauthService {
        let client = MercadoPagoClient::new(provider_config(api_base_url));
        OauthService::new(store, client)
    }

    fn tokens(expires_in: i64, issued_secs_ago: i64) -> OauthTokens {
        let issued = Utc::now() - chrono::Duration::seconds(issued_secs_ago);
        OauthTokens {
            access_token: "APP_USR-current".to_string(),
            refresh_token: "TG-current".to_string(),
            expires_in,
            issued_at: DateTime::from_chrono(issued),
            public_key: Some("APP_USR-pk".to_string()),
        }
    }

    #[tokio::test]
    async fn begin_overwrites_the_pending_verifier() {
        let store = InMemoryCredentialStore::new();
        store
            .insert(TenantCredential::new(7, "Clinic Seven"))
            .await
            .unwrap();
        let service = service_with(store.clone(), "http://127.0.0.1:0");

        service.begin_authorization(7).await.unwrap();
        let first = store
            .find(7)
            .await
            .unwrap()
            .unwrap()
            .pending_code_verifier
            .unwrap();

        service.begin_authorization(7).await.unwrap();
        let second = store
            .find(7)
            .await
            .unwrap()
            .unwrap()
            .pending_code_verifier
            .unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn begin_rejects_unknown_tenant() {
        let store = InMemoryCredentialStore::new();
        let service = service_with(store, "http://127.0.0.1:0");

        match service.begin_authorization(404).await {
            Err(AppError::TenantNotFound(404)) => {}
            other => panic!("expected TenantNotFound, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn complete_without_begin_is_rejected() {
        let store = InMemoryCredentialStore::new();
        store
            .insert(TenantCredential::new(9, "Clinic Nine"))
            .await
            .unwrap();
        let service = service_with(store, "http://127.0.0.1:0");

        match service.complete_authorization("TG-code", "9").await {
            Err(AppError::NoPendingAuthorization(9)) => {}
            other => panic!("expected NoPendingAuthorization, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn complete_rejects_non_numeric_state() {
        let store = InMemoryCredentialStore::new();
        let service = service_with(store, "http://127.0.0.1:0");

        match service.complete_authorization("TG-code", "not-a-tenant").await {
            Err(AppError::Validation(_)) => {}
            other => panic!("expected Validation, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn fresh_token_is_left_untouched() {
        let server = MockServer::start().await;
        // No /oauth/token mock on purpose: a refresh attempt would fail.
        let store = InMemoryCredentialStore::new();
        let mut credential = TenantCredential::new(42, "Clinic FortyTwo");
        credential.oauth = Some(tokens(21_600, 60));
        store.insert(credential).await.unwrap();
        let service = service_with(store.clone(), &server.uri());

        let credential = service.ensure_fresh(42).await.unwrap();
        assert_eq!(
            credential.oauth.unwrap().access_token,
            "APP_USR-current"
        );
    }

    #[tokio::test]
    async fn stale_token_is_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=TG-current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "APP_USR-rotated",
                "token_type": "Bearer",
                "expires_in": 21600,
                "user_id": 556677,
                "refresh_token": "TG-rotated"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = InMemoryCredentialStore::new();
        let mut credential = TenantCredential::new(42, "Clinic FortyTwo");
        // 100 seconds of lifetime left, inside the refresh margin.
        credential.oauth = Some(tokens(21_600, 21_500));
        store.insert(credential).await.unwrap();
        let service = service_with(store.clone(), &server.uri());

        let credential = service.ensure_fresh(42).await.unwrap();
        let rotated = credential.oauth.unwrap();
        assert_eq!(rotated.access_token, "APP_USR-rotated");
        assert_eq!(rotated.refresh_token, "TG-rotated");
        // Public key survives a refresh response that omits it.
        assert_eq!(rotated.public_key.as_deref(), Some("APP_USR-pk"));

        let stored = store.find(42).await.unwrap().unwrap();
        assert_eq!(stored.oauth.unwrap().access_token, "APP_USR-rotated");
        assert_eq!(stored.provider_account_id.as_deref(), Some("556677"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stored_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "invalid refresh token",
                "error": "bad_request",
                "status": 400
            })))
            .mount(&server)
            .await;

        let store = InMemoryCredentialStore::new();
        let mut credential = TenantCredential::new(42, "Clinic FortyTwo");
        credential.oauth = Some(tokens(21_600, 21_500));
        store.insert(credential).await.unwrap();
        let service = service_with(store.clone(), &server.uri());

        match service.ensure_fresh(42).await {
            Err(AppError::Refresh(_)) => {}
            other => panic!("expected Refresh error, got {:?}", other.err()),
        }

        let stored = store.find(42).await.unwrap().unwrap();
        assert_eq!(stored.oauth.unwrap().access_token, "APP_USR-current");
    }

    #[tokio::test]
    async fn unauthorized_tenant_cannot_be_refreshed() {
        let store = InMemoryCredentialStore::new();
        store
            .insert(TenantCredential::new(3, "Clinic Three"))
            .await
            .unwrap();
        let service = service_with(store, "http://127.0.0.1:0");

        match service.ensure_fresh(3).await {
            Err(AppError::TenantNotAuthorized(3)) => {}
            other => panic!("expected TenantNotAuthorized, got {:?}", other.err()),
        }
    }
}
