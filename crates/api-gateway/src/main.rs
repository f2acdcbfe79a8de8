//! API Gateway binary.

use anyhow::Context;
use api_gateway::domain::config::Environment;
use api_gateway::{GatewayConfig, GatewayService};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Authenticating, rate-limiting reverse proxy
#[derive(Parser, Debug)]
#[command(name = "api-gateway")]
#[command(version, about = "Authenticating, rate-limiting reverse proxy for HTTP services")]
struct Args {
    /// Configuration file (TOML). Defaults to ./config.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit JSON logs regardless of environment
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let production = std::env::var("APP_ENV")
        .map(|env| Environment::from_name(&env) == Environment::Production)
        .unwrap_or(false);
    init_tracing(args.log_json || production)?;

    let (path, required) = match args.config {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let config = GatewayConfig::load(&path, required)
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    info!(
        version = api_gateway::VERSION,
        port = config.server.port,
        environment = ?config.server.environment,
        "Starting API Gateway"
    );

    let service = GatewayService::new(config).context("building gateway")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    service.start(shutdown).await.context("serving")?;
    Ok(())
}

/// `RUST_LOG` overrides the default `info` filter
fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.with_thread_ids(true).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
