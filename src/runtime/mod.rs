//! Entry point for the `paygate` binary.
//!
//! The binary only calls [`run`]; everything it does lives here so the
//! subcommands can be driven from tests with an already parsed [`Cli`].

pub mod commands;
pub mod config;

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
pub use cli_defs::{Cli, Commands};
pub use config::GatewayConfig;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Parse CLI arguments and execute the requested subcommand.
///
/// # Errors
///
/// Returns any error emitted while loading configuration or running the
/// subcommand.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli).await
}

/// Execute an already parsed [`Cli`].
///
/// # Errors
///
/// Propagates configuration and subcommand failures.
pub async fn run_with_cli(cli: Cli) -> Result<()> {
    let config = GatewayConfig::load(&cli.gateway).context("failed to load configuration")?;
    init_tracing(&config.log_level);
    let mut out = io::stdout();
    match &cli.command {
        Commands::Ping => commands::ping(&config, &mut out).await,
        Commands::Authorize(args) => commands::authorize(&config, args, &mut out).await,
        Commands::Query(args) => commands::query(&config, args, &mut out).await,
    }
}

/// Install the global subscriber; `RUST_LOG` overrides `level`.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
    if let Err(error) = installed {
        warn!(%error, "tracing subscriber already installed");
    }
}
