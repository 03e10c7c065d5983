//! CLI error types and exit codes.

use fleetmon_core::MonitorError;

/// Exit codes for CLI operations
pub mod exit_codes {
    /// General error - configuration, validation, or usage errors
    pub const GENERAL_ERROR: i32 = 1;
    /// Connection failure - a host could not be reached or authenticated
    pub const CONNECTION_FAILURE: i32 = 2;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Host referenced on the command line is not in the configuration
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// Error from the monitoring core
    #[error("{0}")]
    Monitor(#[from] MonitorError),

    /// Filesystem error while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error while rendering output
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Maps the error to a process exit code
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Monitor(MonitorError::Connection(_) | MonitorError::Auth(_)) => {
                exit_codes::CONNECTION_FAILURE
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
