//! Hotline CLI - watch, rebuild and hot reload a shared library

mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` when set, otherwise `debug` with `--verbose` and `info` without.
fn log_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .init();

    match cli.command {
        Commands::Watch { symbols, json } => {
            commands::watch::run(&cli.config, &symbols, json)?;
        }

        Commands::Run { entry, fps, frames } => {
            commands::run::run(&cli.config, &entry, fps, frames)?;
        }

        Commands::Check => {
            commands::check::run(&cli.config)?;
        }
    }

    Ok(())
}
