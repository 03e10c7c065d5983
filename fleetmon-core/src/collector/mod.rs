//! Metric collectors
//!
//! A collector knows two things: which command strings its metric category
//! needs on a given platform, and how to turn the raw output back into a
//! structured payload. Parsing is a pure function of (output, family) —
//! no I/O, no shared state — so the scheduler owns all execution.

mod database;
mod process;
mod system;
mod webserver;

pub use database::DatabaseCollector;
pub use process::{ProcessCollector, DEFAULT_PATTERNS};
pub use system::SystemCollector;
pub use webserver::WebServerCollector;

use std::time::Duration;

use crate::error::MonitorResult;
use crate::metrics::MetricPayload;
use crate::platform::{PlatformFamily, PlatformProfile};

/// One metric category's collection capability.
///
/// Implementations must be tolerant parsers: missing fields are omitted,
/// stray whitespace and truncation reduce the payload (marked `partial`)
/// rather than failing it. Only output that matches the expected shape
/// nowhere at all becomes a `Parse` error.
pub trait Collector: Send + Sync {
    /// Registry key; duplicates are rejected at registration
    fn name(&self) -> &str;

    /// Polling cadence for the scheduler
    fn interval(&self) -> Duration;

    /// How long a snapshot answers reads without new work
    fn cache_ttl(&self) -> Duration;

    /// Command strings to run on a host with the given profile, in the
    /// order [`Self::parse`] expects their outputs.
    ///
    /// # Errors
    /// `UnsupportedPlatform` when the profile's table has no mapping for
    /// this category.
    fn commands(&self, profile: &PlatformProfile) -> MonitorResult<Vec<String>>;

    /// Parses the batch outputs (same order as [`Self::commands`]).
    ///
    /// # Errors
    /// `Parse` when the output matches the expected shape nowhere.
    fn parse(&self, outputs: &[String], family: PlatformFamily) -> MonitorResult<MetricPayload>;
}

/// Parses `pgrep ... | wc -l` style output
pub(crate) fn parse_count(output: &str) -> Option<i64> {
    output.trim().parse().ok()
}

/// Rounds a percentage to two decimals, the precision every collector
/// reports
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
