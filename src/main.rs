//! API gateway (routing core).
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────┐   watch / get_prefix   ┌─────────────────────────────┐
//!   │  config store    │◀───────────────────────│  watchers (route, service,  │
//!   │  memory | file   │───────────────────────▶│  endpoint, health_check)    │
//!   └──────────────────┘    WatchResponse       └──────────────┬──────────────┘
//!                                                              │ refresh_* / delete_*
//!                                  supervisor ─ respawns ──┐   ▼
//!                                                          │ ┌──────────────────┐
//!   ┌──────────────────┐    set online/offline, views      └▶│  routing table   │
//!   │    admin API     │──────────────────────────────────────▶│ table ⊇ online   │
//!   └──────────────────┘                                    └──────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use api_gateway::config::{load_config, GatewayConfig};
use api_gateway::lifecycle::{self, signals, Shutdown};
use api_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "API gateway routing core", long_about = None)]
struct Args {
    /// Path to gateway.toml. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gateway starting");

    tracing::info!(
        store = ?config.store.backend,
        root = %config.store.root,
        admin_enabled = config.admin.enabled,
        admin_address = %config.admin.bind_address,
        "Configuration loaded"
    );

    let gateway = lifecycle::start(config).await?;

    let shutdown = Shutdown::new();
    let stopped = shutdown.wait();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        shutdown.trigger();
    });

    gateway.run(stopped).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
