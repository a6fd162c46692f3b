use payment_broker::{config::Config, Application};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,payment_broker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    let application = Application::build(config).await?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = application.port(),
        "Payment broker starting"
    );

    application.run_until_stopped().await
}
