//! `FleetMon` Core Library
//!
//! Agentless SSH health monitoring for a fleet of servers: persistent
//! multiplexed sessions, platform-aware metric collection, and a
//! freshness cache that front ends read without ever touching the
//! network. No agent, no daemon, nothing installed on the monitored
//! hosts.
//!
//! # Crate Structure
//!
//! - [`host`] - Host identity and authentication references
//! - [`pool`] - Connection pool, transports, batch execution
//! - [`session`] - Per-host session lifecycle and reconnect backoff
//! - [`platform`] - OS family detection and per-family command tables
//! - [`collector`] - Metric collectors (system, webserver, database, process)
//! - [`scheduler`] - Periodic collection, freshness cache, backpressure
//! - [`metrics`] - Snapshot and payload data model
//! - [`config`] - Monitoring settings and registry construction
//! - [`error`] - Error taxonomy shared by every subsystem
//! - [`testing`] - Scripted transport doubles for tests

#![warn(missing_docs)]

pub mod collector;
pub mod config;
pub mod error;
pub mod host;
pub mod metrics;
pub mod platform;
pub mod pool;
pub mod scheduler;
pub mod session;
pub mod testing;

pub use collector::{
    Collector, DatabaseCollector, ProcessCollector, SystemCollector, WebServerCollector,
};
pub use config::{CollectorSettings, MonitorSettings};
pub use error::{MonitorError, MonitorResult};
pub use host::{AuthMethod, HostIdentity, DEFAULT_SSH_PORT};
pub use metrics::{MetricPayload, MetricSnapshot, MetricValue, SnapshotError, SnapshotErrorKind};
pub use platform::{MetricCategory, PlatformFamily, PlatformProfile, PlatformResolver};
pub use pool::transport::{SshTransport, SshTransportConfig, Transport, TransportSession};
pub use pool::{ConnectionPool, PoolConfig};
pub use scheduler::{
    CollectorRegistry, ResultCache, Scheduler, SchedulerConfig, SnapshotView,
};
pub use session::{BackoffConfig, BackoffState, Session, SessionState};
