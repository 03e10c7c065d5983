//! Raw command execution over the pooled session.

use std::path::Path;

use crate::config_file::FleetConfig;
use crate::error::CliError;

/// Runs one shell command on a host and prints its output.
pub async fn cmd_exec(
    config_path: Option<&Path>,
    host: &str,
    command: &[String],
) -> Result<(), CliError> {
    let config = FleetConfig::load(config_path)?;
    if config.host(host).is_none() {
        return Err(CliError::HostNotFound(host.to_string()));
    }
    let monitor = super::build(&config)?;

    let command = command.join(" ");
    let result = monitor.pool.execute(host, &command).await;
    monitor.pool.shutdown().await;

    let output = result?;
    print!("{output}");
    if !output.ends_with('\n') && !output.is_empty() {
        println!();
    }
    Ok(())
}
