pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::http::{header, Method};
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use services::repository::{MongoCredentialStore, MongoPaymentStore};
use services::{
    CredentialStore, MercadoPagoClient, OauthService, PaymentService, PaymentStore,
    PaymentStrategies, ReconciliationService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub oauth: OauthService,
    pub payments: PaymentService,
    pub reconciliation: ReconciliationService,
}

pub struct Application {
    port: u16,
    listener: tokio::net::TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let credentials = MongoCredentialStore::new(&db);
        credentials.init_indexes().await?;

        let payments = MongoPaymentStore::new(&db);
        payments.init_indexes().await?;

        Self::with_stores(config, Arc::new(credentials), Arc::new(payments)).await
    }

    /// Assemble the application against explicit stores. Tests use this with
    /// in-memory stores; `build` wires up MongoDB-backed ones.
    pub async fn with_stores(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        payments: Arc<dyn PaymentStore>,
    ) -> anyhow::Result<Self> {
        services::init_metrics();

        let provider = MercadoPagoClient::new(config.mercadopago.clone());
        let oauth = OauthService::new(credentials, provider.clone());
        let strategies = PaymentStrategies::new(provider.clone(), config.mercadopago.clone());
        let payment_service = PaymentService::new(payments.clone(), oauth.clone(), strategies);
        let reconciliation =
            ReconciliationService::new(payments, provider, config.mercadopago.clone());

        let state = AppState {
            config: config.clone(),
            oauth,
            payments: payment_service,
            reconciliation,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            .route("/payments", post(handlers::payments::generate_payment))
            .route("/payments/webhook", post(handlers::payments::webhook))
            .route("/payments/:id", get(handlers::payments::get_payment))
            .route("/oauth/start/:company_id", get(handlers::oauth::start))
            .route("/oauth/callback", get(handlers::oauth::callback))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get(middleware::REQUEST_ID_HEADER)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .layer(from_fn(middleware::request_id_middleware))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET, Method::POST])
                    .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
            )
            .with_state(state);

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
