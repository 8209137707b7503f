//! main.rs — Rate terminal entry point
//!
//! Usage:
//!   cargo run --bin rate_terminal -- analyze --ticker 10y --horizon 30
//!   cargo run --bin rate_terminal -- simulate --r0 4.25 --seed 7
//!   cargo run --bin rate_terminal -- --help

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rate_terminal::app::{Cli, TerminalApp};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.env_file {
        if let Err(e) = dotenvy::from_path(path).with_context(|| format!("loading {}", path.display())) {
            error!("{e:#}");
            std::process::exit(1);
        }
    }

    if let Err(e) = TerminalApp::new(cli).run().await {
        error!("Rate terminal failed: {e:#}");
        std::process::exit(1);
    }
}
