//! CLI argument parsing types using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// `FleetMon` command-line interface for agentless host monitoring
#[derive(Parser)]
#[command(name = "fleetmon")]
#[command(author, version, about = "Agentless SSH fleet health monitor")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the fleet configuration file
    #[arg(short, long, global = true, env = "FLEETMON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Collect metrics once and print them
    #[command(about = "Run every collector once against the fleet")]
    Check {
        /// Restrict the run to one host id
        host: Option<String>,

        /// Restrict the run to one collector (system, webserver,
        /// database, process)
        #[arg(short = 'C', long)]
        collector: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Monitor continuously until interrupted
    #[command(about = "Watch the fleet, printing each new snapshot as JSON")]
    Watch {
        /// Restrict watching to one host id
        host: Option<String>,
    },

    /// Run one shell command on a host
    #[command(about = "Execute a raw command over the pooled session")]
    Exec {
        /// Host id from the configuration
        host: String,

        /// Command line to run
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Detect a host's platform family
    #[command(about = "Detect and print the platform family of a host")]
    Platform {
        /// Host id from the configuration
        host: String,
    },

    /// List configured collectors and their cadence
    #[command(about = "List registered collectors")]
    Collectors,

    /// Generate shell completions
    #[command(about = "Generate shell completion scripts")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Output format for the check command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned key/value listing
    Table,
    /// One JSON document
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_check_defaults() {
        let cli = Cli::try_parse_from(["fleetmon", "check"]).unwrap();
        match cli.command {
            Commands::Check {
                host,
                collector,
                format,
            } => {
                assert!(host.is_none());
                assert!(collector.is_none());
                assert_eq!(format, OutputFormat::Table);
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn test_exec_requires_command() {
        assert!(Cli::try_parse_from(["fleetmon", "exec", "web1"]).is_err());
        let cli = Cli::try_parse_from(["fleetmon", "exec", "web1", "uptime"]).unwrap();
        match cli.command {
            Commands::Exec { host, command } => {
                assert_eq!(host, "web1");
                assert_eq!(command, vec!["uptime"]);
            }
            _ => panic!("expected exec"),
        }
    }
}
