//! Standalone HTTP server with a supervised lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──start──▶ Starting ──▶ Running ──signal──▶ ShuttingDownGraceful
//!                      │            │                    │            │
//!                      ▼            ▼                 drained      timeout
//!                    Failed       Failed                 │            ▼
//!                                                        │     ShuttingDownHard
//!                                                        ▼            │
//!                                                     Stopped ◀───────┘
//! ```
//!
//! SIGINT, SIGTERM and `GET /stop` start a graceful shutdown. A second
//! SIGINT or SIGTERM exits immediately with status 130 or 143.

use std::path::PathBuf;

use clap::Parser;

use webserver::config::{load_config, ServerConfig};
use webserver::observability::logging;
use webserver::Server;

#[derive(Parser)]
#[command(name = "webserver")]
#[command(about = "HTTP server with graceful, time-bounded shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the server name.
    #[arg(short, long)]
    name: Option<String>,

    /// Override the listen address (e.g. "127.0.0.1:8080" or ":8080").
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(name) = cli.name {
        config.name = name;
    }
    if let Some(address) = cli.address {
        config.address = address;
    }

    logging::init(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        name = %config.name,
        address = %config.address,
        "webserver starting"
    );

    let server = Server::builder().config(config).build()?;
    server.start().await?;

    Ok(())
}
