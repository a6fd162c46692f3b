use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub mercadopago: MercadoPagoConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MercadoPagoConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Platform-owned access token, used for direct payments and status
    /// queries. Tenant-scoped calls use per-tenant tokens instead.
    pub access_token: Secret<String>,
    pub redirect_uri: String,
    pub auth_base_url: String,
    pub api_base_url: String,
    pub notification_url: String,
    /// Marketplace tag sent on checkout preferences and used as the
    /// metadata key.
    pub marketplace: String,
    pub back_urls: BackUrls,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BackUrls {
    pub success: String,
    pub pending: String,
    pub failure: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("BROKER_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("BROKER_SERVICE_PORT")
            .unwrap_or_else(|_| "3007".to_string())
            .parse()?;

        let db_url = env::var("BROKER_DATABASE_URL").expect("BROKER_DATABASE_URL must be set");
        let db_name = env::var("BROKER_DATABASE_NAME").unwrap_or_else(|_| "payment_broker_db".to_string());

        let client_id = env::var("MP_CLIENT_ID").expect("MP_CLIENT_ID must be set");
        let client_secret = env::var("MP_CLIENT_SECRET").expect("MP_CLIENT_SECRET must be set");
        let access_token = env::var("MP_ACCESS_TOKEN").expect("MP_ACCESS_TOKEN must be set");
        let redirect_uri = env::var("MP_REDIRECT_URI").expect("MP_REDIRECT_URI must be set");

        let auth_base_url = env::var("MP_AUTH_BASE_URL")
            .unwrap_or_else(|_| "https://auth.mercadopago.com".to_string());
        let api_base_url = env::var("MP_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.mercadopago.com".to_string());
        let notification_url =
            env::var("MP_NOTIFICATION_URL").expect("MP_NOTIFICATION_URL must be set");
        let marketplace = env::var("MP_MARKETPLACE").unwrap_or_else(|_| "MP-MARKETPLACE".to_string());

        let back_success = env::var("MP_BACK_URL_SUCCESS")
            .unwrap_or_else(|_| "https://http.cat/200".to_string());
        let back_pending = env::var("MP_BACK_URL_PENDING")
            .unwrap_or_else(|_| "https://http.cat/102".to_string());
        let back_failure = env::var("MP_BACK_URL_FAILURE")
            .unwrap_or_else(|_| "https://http.cat/500".to_string());

        let request_timeout_secs = env::var("MP_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            mercadopago: MercadoPagoConfig {
                client_id,
                client_secret: Secret::new(client_secret),
                access_token: Secret::new(access_token),
                redirect_uri,
                auth_base_url,
                api_base_url,
                notification_url,
                marketplace,
                back_urls: BackUrls {
                    success: back_success,
                    pending: back_pending,
                    failure: back_failure,
                },
                request_timeout_secs,
            },
            service_name: "payment-broker".to_string(),
        })
    }
}
