//! # Easel Server
//!
//! Collaborative drawing room server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! easel
//!
//! # Run with custom config
//! easel  # picks up easel.toml from the working directory
//!
//! # Run with environment variables
//! EASEL_PORT=8080 EASEL_HOST=0.0.0.0 easel
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "easel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Easel server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
