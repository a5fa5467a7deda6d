//! relay-hub (v1)
//!
//! A real-time message relay built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                      RELAY HUB                        │
//!                      │                                                       │
//!   ServerSettings ────┼─▶ config ──watch──▶ host controller ──▶ listeners     │
//!   RELAY_* env        │   (validate,        (start / stop /      (one per     │
//!                      │    debounce)         reboot)              port)       │
//!                      │                                              │        │
//!   Client ────────────┼─▶ auth (JWT) ──▶ http router ───────────────┘        │
//!                      │                     │                                 │
//!                      │           control API    WebSocket session            │
//!                      │                     ╲     ╱                           │
//!                      │                      hub ──▶ registry                   │
//!                      │                       │                               │
//!                      │               persistence (unit of work)              │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use relay_hub::auth::JwtKeys;
use relay_hub::config::{ConfigSource, DEFAULT_CONFIG_PATH};
use relay_hub::observability::{logging, metrics, TracingLog};
use relay_hub::Relay;

#[derive(Parser)]
#[command(name = "relay-hub")]
#[command(about = "Real-time message relay with hot-reloaded settings", long_about = None)]
struct Cli {
    /// Path of the JSON settings file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter, e.g. `relay_hub=info`. Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,

    /// Expose Prometheus metrics on this address.
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_level.as_deref());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        "relay-hub starting"
    );

    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr);
    }

    let relay = Relay::new(
        ConfigSource::file(&cli.config),
        JwtKeys::from_env(),
        TracingLog::shared(),
    );
    relay.run().await;
}
