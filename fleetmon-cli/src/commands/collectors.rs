//! Collector listing command.

use std::path::Path;

use crate::config_file::FleetConfig;
use crate::error::CliError;

/// Lists the collectors the configuration would register, with their
/// cadence.
pub fn cmd_collectors(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = FleetConfig::load(config_path)?;
    let registry = config.monitor.build_registry();

    println!("{:<12} {:>10} {:>10}", "collector", "interval", "ttl");
    for collector in registry.iter() {
        println!(
            "{:<12} {:>9}s {:>9}s",
            collector.name(),
            collector.interval().as_secs(),
            collector.cache_ttl().as_secs()
        );
    }
    Ok(())
}
