//! Story API server
//!
//! Configuration comes from the YAML file named by `STORY_API_CONFIG` (all
//! values defaulted) plus the `PORT` and `DATA_FOLDER` overrides.

use anyhow::Result;
use std::sync::Arc;
use story_api::config::AppConfig;
use story_api::resources::User;
use story_api::server::{ServerBuilder, serve_host};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;

    let host = ServerBuilder::from_config(&config)
        .await?
        .register_default_resources()
        .build_host()?;

    User::ensure_admin(
        &host.services,
        &config.auth.default_admin_email,
        &config.auth.default_admin_password,
    )
    .await?;

    serve_host(Arc::new(host), &config.bind_address()).await
}
