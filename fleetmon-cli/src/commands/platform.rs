//! Platform detection command.

use std::path::Path;

use crate::config_file::FleetConfig;
use crate::error::CliError;

/// Detects and prints the platform family of one host.
pub async fn cmd_platform(config_path: Option<&Path>, host: &str) -> Result<(), CliError> {
    let config = FleetConfig::load(config_path)?;
    if config.host(host).is_none() {
        return Err(CliError::HostNotFound(host.to_string()));
    }
    let monitor = super::build(&config)?;

    let result = monitor.resolver.resolve(host).await;
    monitor.pool.shutdown().await;

    let profile = result?;
    println!("{host}: {}", profile.family);
    Ok(())
}
