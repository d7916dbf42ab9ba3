//! Lambda gateway binary.
//!
//! Serves the HTTP front door and either the Lambda Runtime API (when
//! `RUNTIME_API_PORT` is set) or the bundled `status_ok` handler.
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of priority):
//! 1. Default values
//! 2. Config file: `/var/task/gateway.toml`, or `LAMBDA_GATEWAY_CONFIG`
//! 3. The standard Lambda environment variables (`AWS_LAMBDA_FUNCTION_NAME`,
//!    `PORT`, `QUEUE_LIMIT`, ...)
//! 4. Environment variables with the `LAMBDA_GATEWAY_` prefix

use anyhow::{Context, Result};
use lambda_gateway::{Gateway, GatewayConfig, StderrSink, handler};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("failed to initialise tracing subscriber")?;

    let config = GatewayConfig::load().context("failed to load configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    let gateway = Gateway::builder()
        .config(config)
        .log_sink(Arc::new(StderrSink))
        .build()
        .await
        .context("failed to start gateway")?;

    match gateway.runtime_api_host_port() {
        Some(host_port) => {
            tracing::info!("Waiting for a runtime on AWS_LAMBDA_RUNTIME_API={}", host_port);
        }
        None => {
            let control = gateway.control();
            tokio::spawn(async move {
                if let Err(e) = handler::run(control, handler::status_ok).await {
                    tracing::error!("Handler loop stopped: {}", e);
                }
            });
        }
    }

    tracing::info!("Accepting requests on {}", gateway.url());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for interrupt signal")?;
    tracing::info!("Caught interrupt signal");

    gateway.shutdown().await;
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lambda_gateway=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).without_time())
        .with(filter)
        .try_init()
        .context("failed to initialise tracing registry")?;

    Ok(())
}
