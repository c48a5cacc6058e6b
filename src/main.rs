//! Loyalteez Discord Gateway Server
//!
//! Receives Discord interactions and issues Loyalteez rewards

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use loyalteez_discord::{AppState, Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loyalteez-discord-server")]
#[command(version)]
#[command(about = "Discord interaction endpoint for Loyalteez rewards", long_about = None)]
struct Cli {
    /// Path to config.toml (embedded defaults are used when missing)
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Host to bind (overrides config)
    #[arg(long, env = "GATEWAY_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "GATEWAY_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting Loyalteez Discord Gateway");

    let config = Config::load_from(&cli.config)?;

    // Refuse to serve without a signing key or brand id
    let state = AppState::from_config(&config).map_err(|e| {
        error!("Invalid configuration: {:#}", e);
        e
    })?;
    info!(
        "Configured for brand {} (store: {:?})",
        state.rewards.brand_id(),
        config.store.backend
    );

    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);

    loyalteez_discord::run_server(&host, port, Arc::new(state)).await?;

    Ok(())
}
