//! Monitoring settings
//!
//! Deserializable from the front-end's config file; every field has a
//! default so an empty document yields a working setup. `validate`
//! clamps out-of-range values instead of rejecting the document, and
//! the `build_*` methods turn settings into the live objects the rest
//! of the crate consumes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::collector::{
    Collector, DatabaseCollector, ProcessCollector, SystemCollector, WebServerCollector,
    DEFAULT_PATTERNS,
};
use crate::pool::{PoolConfig, DEFAULT_SHUTDOWN_GRACE_SECS};
use crate::scheduler::{CollectorRegistry, SchedulerConfig, DEFAULT_MAX_IN_FLIGHT};
use crate::session::BackoffConfig;

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_shutdown_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

fn default_true() -> bool {
    true
}

fn default_process_patterns() -> Vec<String> {
    DEFAULT_PATTERNS.iter().map(|p| (*p).to_string()).collect()
}

/// Cadence overrides for one collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorSettings {
    /// Whether the collector is registered at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Polling interval in seconds; collector default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    /// Freshness window in seconds; collector default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        default_collector_settings()
    }
}

impl CollectorSettings {
    fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(|s| Duration::from_secs(s.max(1)))
    }

    fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(|s| Duration::from_secs(s.max(1)))
    }
}

fn default_collector_settings() -> CollectorSettings {
    CollectorSettings {
        enabled: true,
        interval_secs: None,
        cache_ttl_secs: None,
    }
}

/// Top-level monitoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Reconnect backoff shared by all sessions
    pub backoff: BackoffConfig,
    /// Fleet-wide cap on simultaneous collection runs
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Seconds granted to each session teardown during shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// System collector overrides
    #[serde(default = "default_collector_settings")]
    pub system: CollectorSettings,
    /// Web server collector overrides
    #[serde(default = "default_collector_settings")]
    pub webserver: CollectorSettings,
    /// Database collector overrides
    #[serde(default = "default_collector_settings")]
    pub database: CollectorSettings,
    /// Process collector overrides
    #[serde(default = "default_collector_settings")]
    pub process: CollectorSettings,
    /// Command patterns the process collector aggregates
    #[serde(default = "default_process_patterns")]
    pub process_patterns: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            max_in_flight: default_max_in_flight(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            system: default_collector_settings(),
            webserver: default_collector_settings(),
            database: default_collector_settings(),
            process: default_collector_settings(),
            process_patterns: default_process_patterns(),
        }
    }
}

impl MonitorSettings {
    /// Clamps out-of-range values to usable ones, logging each fixup
    pub fn validate(&mut self) {
        if self.max_in_flight == 0 {
            tracing::warn!("max_in_flight of 0 clamped to 1");
            self.max_in_flight = 1;
        }
        if self.process_patterns.is_empty() {
            tracing::warn!("empty process pattern list replaced with defaults");
            self.process_patterns = default_process_patterns();
        }
    }

    /// Pool configuration derived from these settings
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_backoff(self.backoff.clone())
            .with_shutdown_grace(Duration::from_secs(self.shutdown_grace_secs.max(1)))
    }

    /// Scheduler configuration derived from these settings
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_max_in_flight(self.max_in_flight)
            .with_shutdown_grace(Duration::from_secs(self.shutdown_grace_secs.max(1)))
    }

    /// Builds the registry with every enabled collector, cadence
    /// overrides applied
    #[must_use]
    pub fn build_registry(&self) -> CollectorRegistry {
        let mut registry = CollectorRegistry::new();
        let entries: [(&CollectorSettings, Arc<dyn Collector>); 4] = [
            (&self.system, {
                let mut c = SystemCollector::new();
                if let Some(interval) = self.system.interval() {
                    c = c.with_interval(interval);
                }
                if let Some(ttl) = self.system.cache_ttl() {
                    c = c.with_cache_ttl(ttl);
                }
                Arc::new(c)
            }),
            (&self.webserver, {
                let mut c = WebServerCollector::new();
                if let Some(interval) = self.webserver.interval() {
                    c = c.with_interval(interval);
                }
                if let Some(ttl) = self.webserver.cache_ttl() {
                    c = c.with_cache_ttl(ttl);
                }
                Arc::new(c)
            }),
            (&self.database, {
                let mut c = DatabaseCollector::new();
                if let Some(interval) = self.database.interval() {
                    c = c.with_interval(interval);
                }
                if let Some(ttl) = self.database.cache_ttl() {
                    c = c.with_cache_ttl(ttl);
                }
                Arc::new(c)
            }),
            (&self.process, {
                let mut c = ProcessCollector::with_patterns(self.process_patterns.iter().cloned());
                if let Some(interval) = self.process.interval() {
                    c = c.with_interval(interval);
                }
                if let Some(ttl) = self.process.cache_ttl() {
                    c = c.with_cache_ttl(ttl);
                }
                Arc::new(c)
            }),
        ];
        for (settings, collector) in entries {
            if settings.enabled {
                // Names are distinct within the built-in set
                let _ = registry.register(collector);
            }
        }
        registry
    }
}
