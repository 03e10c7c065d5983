//! Command handler modules for the CLI.

mod check;
mod collectors;
mod completions;
mod exec;
mod platform;
mod watch;

use std::path::Path;
use std::sync::Arc;

use fleetmon_core::platform::PlatformResolver;
use fleetmon_core::pool::transport::SshTransport;
use fleetmon_core::pool::ConnectionPool;
use fleetmon_core::scheduler::Scheduler;

use crate::cli::Commands;
use crate::config_file::FleetConfig;
use crate::error::CliError;

/// Dispatch a CLI command to the appropriate handler.
pub async fn dispatch(config_path: Option<&Path>, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Check {
            host,
            collector,
            format,
        } => check::cmd_check(config_path, host.as_deref(), collector.as_deref(), format).await,
        Commands::Watch { host } => watch::cmd_watch(config_path, host.as_deref()).await,
        Commands::Exec { host, command } => exec::cmd_exec(config_path, &host, &command).await,
        Commands::Platform { host } => platform::cmd_platform(config_path, &host).await,
        Commands::Collectors => collectors::cmd_collectors(config_path),
        Commands::Completions { shell } => {
            completions::cmd_completions(shell);
            Ok(())
        }
    }
}

/// Live monitoring stack assembled from one configuration document
pub(crate) struct Monitor {
    pub pool: Arc<ConnectionPool>,
    pub resolver: Arc<PlatformResolver>,
    pub scheduler: Scheduler,
}

/// Builds the pool, resolver, and scheduler and registers every
/// configured host. No network activity happens here.
pub(crate) fn build(config: &FleetConfig) -> Result<Monitor, CliError> {
    let transport = Arc::new(SshTransport::default());
    let pool = Arc::new(ConnectionPool::new(transport, config.monitor.pool_config()));
    for entry in &config.hosts {
        pool.register(entry.identity()?)?;
    }
    let resolver = Arc::new(PlatformResolver::new(Arc::clone(&pool)));
    let scheduler = Scheduler::new(
        Arc::clone(&pool),
        Arc::clone(&resolver),
        config.monitor.build_registry(),
        config.monitor.scheduler_config(),
    );
    Ok(Monitor {
        pool,
        resolver,
        scheduler,
    })
}
