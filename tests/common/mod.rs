use std::sync::Arc;

use chrono::Utc;
use mongodb::bson::DateTime;
use secrecy::Secret;
use wiremock::MockServer;

use payment_broker::config::{BackUrls, Config, DatabaseConfig, MercadoPagoConfig, ServerConfig};
use payment_broker::models::{OauthTokens, PaymentRecord, TenantCredential};
use payment_broker::services::memory::{InMemoryCredentialStore, InMemoryPaymentStore};
use payment_broker::services::{CredentialStore, PaymentStore};
use payment_broker::Application;

pub const PLATFORM_TOKEN: &str = "APP_USR-platform";

/// A running application on a random port, talking to a mock provider and
/// in-memory stores.
pub struct TestApp {
    pub address: String,
    pub provider: MockServer,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub payments: Arc<InMemoryPaymentStore>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let provider = MockServer::start().await;

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: Secret::new("mongodb://localhost:27017".to_string()),
                db_name: "payment_broker_test".to_string(),
            },
            mercadopago: MercadoPagoConfig {
                client_id: "8973882513782".to_string(),
                client_secret: Secret::new("client-secret".to_string()),
                access_token: Secret::new(PLATFORM_TOKEN.to_string()),
                redirect_uri: "https://broker.example.com/oauth/callback".to_string(),
                auth_base_url: "https://auth.mercadopago.com".to_string(),
                api_base_url: provider.uri(),
                notification_url: "https://broker.example.com/payments/webhook".to_string(),
                marketplace: "MP-MARKETPLACE".to_string(),
                back_urls: BackUrls {
                    success: "https://http.cat/200".to_string(),
                    pending: "https://http.cat/102".to_string(),
                    failure: "https://http.cat/500".to_string(),
                },
                request_timeout_secs: 5,
            },
            service_name: "payment-broker".to_string(),
        };

        let credentials = InMemoryCredentialStore::new();
        let payments = InMemoryPaymentStore::new();

        let app = Application::with_stores(config, credentials.clone(), payments.clone())
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            provider,
            credentials,
            payments,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Register a tenant that has not completed authorization yet.
    pub async fn seed_tenant(&self, tenant_id: i64, name: &str) {
        self.credentials
            .insert(TenantCredential::new(tenant_id, name))
            .await
            .expect("Failed to seed tenant");
    }

    /// Store a pending payment record, as the broker would after creating a
    /// checkout preference.
    pub async fn seed_payment(&self, provider_payment_id: &str) {
        let now = DateTime::now();
        self.payments
            .insert(PaymentRecord {
                provider_payment_id: provider_payment_id.to_string(),
                status: "pending".to_string(),
                status_detail: "pending".to_string(),
                description: "Monthly subscription".to_string(),
                modality: "regular_payment".to_string(),
                method: "account_money".to_string(),
                payer_email: "jane.roe@example.com".to_string(),
                payer_identification_type: "DNI".to_string(),
                payer_identification_number: "12345678".to_string(),
                total_amount: 150.0,
                commission: 15.0,
                net_amount: 135.0,
                currency: "ARS".to_string(),
                date_created: "2024-05-01T12:00:00.000-04:00".to_string(),
                date_approved: "2024-05-01T12:00:00.000-04:00".to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("Failed to seed payment");
    }

    /// Register a tenant with a fresh, authorized credential.
    pub async fn seed_authorized_tenant(&self, tenant_id: i64, name: &str, access_token: &str) {
        let mut credential = TenantCredential::new(tenant_id, name);
        credential.oauth = Some(OauthTokens {
            access_token: access_token.to_string(),
            refresh_token: format!("TG-refresh-{}", tenant_id),
            expires_in: 21_600,
            issued_at: DateTime::from_chrono(Utc::now()),
            public_key: Some("APP_USR-public-key".to_string()),
        });
        self.credentials
            .insert(credential)
            .await
            .expect("Failed to seed authorized tenant");
    }
}
