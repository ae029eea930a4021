//! # Ferry Server
//!
//! Content-based push notification router for public transport events.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! ferry
//!
//! # Run with a specific config file
//! FERRY_CONFIG=/path/to/ferry.toml ferry
//!
//! # Run with environment variables
//! FERRY_PORT=8080 FERRY_HOST=0.0.0.0 ferry
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
                .unwrap_or_else(|_| "ferry=debug,ferry_core=debug,ferry_delivery=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Ferry server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
