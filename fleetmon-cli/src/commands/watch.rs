//! Continuous monitoring until interrupted.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use fleetmon_core::scheduler::SnapshotView;

use crate::config_file::FleetConfig;
use crate::error::CliError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Watches the fleet (or one host) and prints every new snapshot as
/// one JSON line until Ctrl-C.
pub async fn cmd_watch(config_path: Option<&Path>, host: Option<&str>) -> Result<(), CliError> {
    let config = FleetConfig::load(config_path)?;
    let monitor = super::build(&config)?;

    match host {
        Some(id) => monitor.scheduler.watch_host(id).await?,
        None => monitor.scheduler.watch_all().await?,
    }
    tracing::info!(hosts = monitor.pool.host_ids().len(), "watching fleet");

    let mut printed: HashMap<(String, String), u64> = HashMap::new();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                emit_new_snapshots(&monitor, &mut printed)?;
            }
        }
    }

    tracing::info!("interrupt received, shutting down");
    monitor.scheduler.shutdown().await;
    Ok(())
}

fn emit_new_snapshots(
    monitor: &super::Monitor,
    printed: &mut HashMap<(String, String), u64>,
) -> Result<(), CliError> {
    for host in monitor.pool.host_ids() {
        for name in monitor.scheduler.collector_names() {
            let SnapshotView::Ready(snapshot) = monitor.scheduler.snapshot(&host, name) else {
                continue;
            };
            let key = (host.clone(), name.to_string());
            if printed.get(&key).copied() == Some(snapshot.generation) {
                continue;
            }
            println!("{}", serde_json::to_string(&snapshot)?);
            printed.insert(key, snapshot.generation);
        }
    }
    Ok(())
}
