//! Wellspring daemon - search-augmented answer engine.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wellspringd::config::{Config, CONFIG_PATH};
use wellspringd::server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load(&config_path)?;

    info!("wellspringd v{} starting", env!("CARGO_PKG_VERSION"));

    let state = server::build_state(&config)?;
    server::run(state, &config.server.bind_addr).await
}
