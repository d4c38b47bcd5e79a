//! Klear - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the inpainting and plan API.

use klear::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "klear=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: auth_required={}, replicate_configured={}, rate_limit={}/{}s",
        config.auth_required(),
        config.replicate.api_token.is_some(),
        config.rate_limit.max_requests,
        config.rate_limit.window.as_secs()
    );

    // Start HTTP server
    info!("Starting server on {}:{}", config.host, config.port);
    api::serve(config).await?;

    Ok(())
}
