//! `FleetMon` CLI - agentless SSH health monitoring for a fleet of
//! servers.
//!
//! Provides commands for one-shot checks, continuous watching, raw
//! command execution, platform detection, and collector listing, all
//! driven by a TOML fleet configuration.

mod cli;
mod commands;
mod config_file;
mod error;
mod format;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = commands::dispatch(cli.config.as_deref(), cli.command).await {
        if !cli.quiet {
            eprintln!("Error: {e}");
        }
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("fleetmon={level},fleetmon_core={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
