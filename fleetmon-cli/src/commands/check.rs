//! One-shot collection across the fleet.

use std::path::Path;

use crate::cli::OutputFormat;
use crate::config_file::FleetConfig;
use crate::error::CliError;
use crate::format;

/// Runs the selected collectors once against the selected hosts and
/// prints the results.
pub async fn cmd_check(
    config_path: Option<&Path>,
    host: Option<&str>,
    collector: Option<&str>,
    output: OutputFormat,
) -> Result<(), CliError> {
    let config = FleetConfig::load(config_path)?;
    let monitor = super::build(&config)?;

    let hosts: Vec<String> = match host {
        Some(id) => {
            if config.host(id).is_none() {
                return Err(CliError::HostNotFound(id.to_string()));
            }
            vec![id.to_string()]
        }
        None => monitor.pool.host_ids(),
    };
    let collector_names: Vec<String> = {
        let registered = monitor.scheduler.collector_names();
        match collector {
            Some(name) => {
                if !registered.contains(&name) {
                    return Err(CliError::Config(format!(
                        "unknown collector '{name}' (registered: {})",
                        registered.join(", ")
                    )));
                }
                vec![name.to_string()]
            }
            None => registered.iter().map(|n| (*n).to_string()).collect(),
        }
    };

    let mut snapshots = Vec::new();
    for host in &hosts {
        for name in &collector_names {
            let snapshot = monitor.scheduler.refresh(host, name).await?;
            snapshots.push(snapshot);
        }
    }

    print!("{}", format::render(&snapshots, output)?);
    monitor.scheduler.shutdown().await;

    if !snapshots.is_empty() && snapshots.iter().all(|s| !s.is_ok()) {
        return Err(CliError::Monitor(
            fleetmon_core::MonitorError::Connection(
                "every collection failed; see output above".to_string(),
            ),
        ));
    }
    Ok(())
}
