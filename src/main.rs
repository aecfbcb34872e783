use anyhow::Result;
use linkdata_formatter::{start_web_server, ConfigManager};
use std::fs::OpenOptions;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging first
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true) // Clear file on startup
        .open("/tmp/linkform.log")
        .expect("Failed to open log file");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_writer(file)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(
            EnvFilter::from_default_env()
                .add_directive("info".parse().expect("Invalid log directive")),
        )
        .init();

    let port = std::env::var("ROCKET_PORT")
        .map_err(|_| anyhow::anyhow!("ROCKET_PORT environment variable not set"))?
        .parse::<u16>()
        .map_err(|_| anyhow::anyhow!("ROCKET_PORT must be a valid port number"))?;

    let jwt_secret = std::env::var("SESSION_SECRET")
        .map_err(|_| anyhow::anyhow!("SESSION_SECRET environment variable not set"))?;

    let config = ConfigManager::load()?;
    config.ensure_directories().await?;

    tracing::info!("Starting LinkData Formatter API Server");
    tracing::info!(
        "Environment: {}",
        std::env::var("ENVIRONMENT").unwrap_or_else(|_| "local".to_string())
    );
    tracing::info!(
        "Database: {}",
        config.environment.database_path.display()
    );
    tracing::info!("Server: http://0.0.0.0:{}", port);
    tracing::info!("Webhook: {}", config.service.webhook_url);

    start_web_server(
        config.environment.database_path.clone(),
        config.service,
        jwt_secret,
        port,
    )
    .await
}
