//! Error types for the monitoring core
//!
//! Each failure class maps to one variant so callers can decide whether to
//! retry (`Connection`), give up on the session (`Auth`), or record the
//! failure into a snapshot (`Parse`, `UnsupportedPlatform`).

/// Errors produced by the pool, resolver, collectors, and scheduler
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MonitorError {
    /// Transient transport failure (unreachable, timeout, session reset).
    /// Retryable through the pool's backoff policy.
    #[error("connection error: {0}")]
    Connection(String),

    /// Authentication rejected by the remote host. Not retried; the
    /// session stays failed until reconfigured.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Command output did not match the expected shape at all
    #[error("parse error: {0}")]
    Parse(String),

    /// The detected platform family has no command mapping for a collector
    #[error("collector '{collector}' is unsupported on platform '{family}'")]
    UnsupportedPlatform {
        /// Collector that could not run
        collector: String,
        /// Detected platform family name
        family: String,
    },

    /// A collector with the same name is already registered
    #[error("collector '{0}' is already registered")]
    DuplicateCollector(String),

    /// Invalid configuration passed at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The host id is not registered in the pool
    #[error("host '{0}' is not registered")]
    HostNotFound(String),

    /// The pool or scheduler is shutting down
    #[error("shutting down")]
    ShuttingDown,
}

impl MonitorError {
    /// Returns true for failures the pool may retry
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type used throughout the core
pub type MonitorResult<T> = Result<T, MonitorError>;
