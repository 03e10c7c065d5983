//! Metric data model
//!
//! All types are transport-free and serializable so the presentation and
//! export collaborators can consume them directly. A snapshot is replaced
//! wholesale on every collection; readers always see a complete value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::MonitorError;

/// One structured metric field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Boolean flag (e.g. `config_valid`)
    Bool(bool),
    /// Integer counter or count
    Integer(i64),
    /// Floating-point gauge (percentages, load averages)
    Float(f64),
    /// Free-form text (versions, service states)
    Text(String),
}

impl MetricValue {
    /// Numeric view of the value, if it has one
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    /// Integer view of the value, if it is one
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view of the value, if it is one
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Structured result of one parse routine.
///
/// Ordered so serialized output is stable. `partial` marks a payload where
/// some expected sections could not be parsed; what did parse is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    /// Metric fields keyed by dotted name (e.g. `cpu.usage_percent`)
    pub fields: BTreeMap<String, MetricValue>,
    /// True when part of the output was missing or unparseable
    #[serde(default)]
    pub partial: bool,
}

impl MetricPayload {
    /// Creates an empty payload
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetricValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Looks up a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.fields.get(key)
    }

    /// Numeric field lookup shorthand
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(MetricValue::as_f64)
    }

    /// Marks the payload as incomplete
    pub const fn mark_partial(&mut self) {
        self.partial = true;
    }

    /// Whether no field parsed at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Failure class recorded in an error snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotErrorKind {
    /// Transport failure after retries
    Connection,
    /// Authentication rejected
    Auth,
    /// Output did not match the expected shape
    Parse,
    /// No command mapping for the detected platform
    UnsupportedPlatform,
    /// Anything else (registry, shutdown races)
    Internal,
}

/// Error detail captured into a snapshot instead of propagating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotError {
    /// Failure class
    pub kind: SnapshotErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl From<&MonitorError> for SnapshotError {
    fn from(err: &MonitorError) -> Self {
        let kind = match err {
            MonitorError::Connection(_) => SnapshotErrorKind::Connection,
            MonitorError::Auth(_) => SnapshotErrorKind::Auth,
            MonitorError::Parse(_) => SnapshotErrorKind::Parse,
            MonitorError::UnsupportedPlatform { .. } => SnapshotErrorKind::UnsupportedPlatform,
            _ => SnapshotErrorKind::Internal,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Latest captured result for one (host, collector) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Host id
    pub host: String,
    /// Collector name
    pub collector: String,
    /// When the collection completed
    pub captured_at: DateTime<Utc>,
    /// Monotonic per-key counter; guards against out-of-order completion
    pub generation: u64,
    /// Payload or captured error
    pub result: Result<MetricPayload, SnapshotError>,
}

impl MetricSnapshot {
    /// Age of the snapshot relative to `now`
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the snapshot is younger than `ttl`
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < ttl
    }

    /// Whether the last collection succeeded
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
