//! Fleetwatch - watch and steer a fleet of agent sessions from the terminal.
//!
//! Backend addresses come from the environment (see `fleetwatch::config`).
//! Diagnostics go to stderr, filtered by `FLEETWATCH_LOG` or `RUST_LOG`.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fleetwatch::cli::{execute, Cli};
use fleetwatch::Config;

fn init_tracing() {
    let filter = std::env::var("FLEETWATCH_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    execute(cli, Config::from_env()).await
}
