//! Process presence and resource aggregation
//!
//! Scans the full `ps aux` table once and aggregates rows whose command
//! line matches any monitored pattern: match count, summed CPU and
//! memory percentages, summed resident set. Kernel threads and the
//! `ps`/`grep` machinery itself are excluded.

use std::time::Duration;

use super::{round2, Collector};
use crate::error::{MonitorError, MonitorResult};
use crate::metrics::MetricPayload;
use crate::platform::{MetricCategory, PlatformFamily, PlatformProfile};

/// Default polling interval
pub const DEFAULT_PROCESS_INTERVAL_SECS: u64 = 5;
/// Default snapshot freshness window
pub const DEFAULT_PROCESS_TTL_SECS: u64 = 5;

/// Service patterns watched when none are configured
pub const DEFAULT_PATTERNS: &[&str] = &[
    "node", "python", "java", "docker", "pm2", "gunicorn", "uwsgi", "celery",
];

/// Aggregates `ps aux` rows per monitored command pattern
pub struct ProcessCollector {
    interval: Duration,
    cache_ttl: Duration,
    patterns: Vec<String>,
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessCollector {
    /// Creates the collector watching [`DEFAULT_PATTERNS`]
    #[must_use]
    pub fn new() -> Self {
        Self::with_patterns(DEFAULT_PATTERNS.iter().map(|p| (*p).to_string()))
    }

    /// Creates the collector watching the given command patterns
    #[must_use]
    pub fn with_patterns(patterns: impl IntoIterator<Item = String>) -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_PROCESS_INTERVAL_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_PROCESS_TTL_SECS),
            patterns: patterns.into_iter().collect(),
        }
    }

    /// Overrides the polling interval
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the cache TTL
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Patterns currently watched
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    fn commands(&self, profile: &PlatformProfile) -> MonitorResult<Vec<String>> {
        let command = profile.command(MetricCategory::ProcessList).ok_or_else(|| {
            MonitorError::UnsupportedPlatform {
                collector: self.name().to_string(),
                family: profile.family.as_str().to_string(),
            }
        })?;
        Ok(vec![command.to_string()])
    }

    fn parse(&self, outputs: &[String], _family: PlatformFamily) -> MonitorResult<MetricPayload> {
        let table = outputs
            .first()
            .ok_or_else(|| MonitorError::Parse("process table output missing".to_string()))?;

        let rows: Vec<PsRow> = table.lines().filter_map(PsRow::parse).collect();
        if rows.is_empty() {
            return Err(MonitorError::Parse(
                "no row of the process table parsed".to_string(),
            ));
        }

        let mut payload = MetricPayload::new();
        payload.set("total_processes", i64::try_from(rows.len()).unwrap_or(i64::MAX));

        for pattern in &self.patterns {
            let mut count = 0_i64;
            let mut cpu = 0.0_f64;
            let mut mem = 0.0_f64;
            let mut rss = 0_u64;
            for row in rows.iter().filter(|row| row.matches(pattern)) {
                count += 1;
                cpu += row.cpu_percent;
                mem += row.mem_percent;
                rss += row.rss_kib;
            }
            payload.set(format!("{pattern}.count"), count);
            if count > 0 {
                payload.set(format!("{pattern}.cpu_percent"), round2(cpu));
                payload.set(format!("{pattern}.mem_percent"), round2(mem));
                payload.set(format!("{pattern}.rss_kib"), rss);
            }
        }
        Ok(payload)
    }
}

/// One parsed `ps aux` row
struct PsRow {
    cpu_percent: f64,
    mem_percent: f64,
    rss_kib: u64,
    command: String,
}

impl PsRow {
    /// Parses the fixed columns; the command is everything after them.
    /// Header lines and malformed rows return `None`.
    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 11 {
            return None;
        }
        Some(Self {
            cpu_percent: fields[2].parse().ok()?,
            mem_percent: fields[3].parse().ok()?,
            rss_kib: fields[5].parse().ok()?,
            command: fields[10..].join(" "),
        })
    }

    /// Pattern match against the command line, skipping kernel threads
    /// and the scan machinery itself
    fn matches(&self, pattern: &str) -> bool {
        !self.command.starts_with('[')
            && !self.command.starts_with("grep ")
            && !self.command.starts_with("ps ")
            && self.command.contains(pattern)
    }
}
