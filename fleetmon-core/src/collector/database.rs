//! Database service health: MySQL/MariaDB, PostgreSQL, Redis
//!
//! Presence is established from process counts and service state; Redis
//! additionally exposes version and uptime through `redis-cli info`.
//! Deep engine statistics need credentials and stay out of scope.

use std::time::Duration;

use super::{parse_count, Collector};
use crate::error::{MonitorError, MonitorResult};
use crate::metrics::MetricPayload;
use crate::platform::{PlatformFamily, PlatformProfile};

/// Default polling interval
pub const DEFAULT_DATABASE_INTERVAL_SECS: u64 = 10;
/// Default snapshot freshness window
pub const DEFAULT_DATABASE_TTL_SECS: u64 = 10;

/// Collects database service health
pub struct DatabaseCollector {
    interval: Duration,
    cache_ttl: Duration,
}

impl Default for DatabaseCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseCollector {
    /// Creates the collector with default cadence
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_DATABASE_INTERVAL_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_DATABASE_TTL_SECS),
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
}

impl Collector for DatabaseCollector {
    fn name(&self) -> &str {
        "database"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    fn commands(&self, profile: &PlatformProfile) -> MonitorResult<Vec<String>> {
        if profile.family == PlatformFamily::Unknown {
            return Err(MonitorError::UnsupportedPlatform {
                collector: self.name().to_string(),
                family: profile.family.as_str().to_string(),
            });
        }
        Ok(vec![
            "pgrep -f mysqld 2>/dev/null | wc -l".to_string(),
            "pgrep -f 'postgres:' 2>/dev/null | wc -l".to_string(),
            "pgrep -x redis-server 2>/dev/null | wc -l".to_string(),
            "systemctl is-active mysql 2>/dev/null || systemctl is-active mariadb 2>/dev/null || echo unknown"
                .to_string(),
            "systemctl is-active postgresql 2>/dev/null || echo unknown".to_string(),
            "systemctl is-active redis 2>/dev/null || systemctl is-active redis-server 2>/dev/null || echo unknown"
                .to_string(),
            "redis-cli --no-raw info server 2>/dev/null || echo __unavailable__".to_string(),
        ])
    }

    fn parse(&self, outputs: &[String], _family: PlatformFamily) -> MonitorResult<MetricPayload> {
        let mut payload = MetricPayload::new();
        let engines = [("mysql", 0, 3), ("postgres", 1, 4), ("redis", 2, 5)];

        let mut any_count = false;
        for (engine, count_idx, state_idx) in engines {
            if let Some(count) = outputs.get(count_idx).and_then(|o| parse_count(o)) {
                payload.set(format!("{engine}.process_count"), count);
                payload.set(format!("{engine}.running"), count > 0);
                any_count = true;
            } else {
                payload.mark_partial();
            }
            if let Some(state) = outputs
                .get(state_idx)
                .map(|o| o.trim())
                .filter(|s| !s.is_empty())
            {
                payload.set(
                    format!("{engine}.service_state"),
                    state.lines().next().unwrap_or(state),
                );
            }
        }
        if !any_count {
            return Err(MonitorError::Parse(
                "database process counts missing from output".to_string(),
            ));
        }

        if payload.get_f64("redis.process_count").unwrap_or(0.0) > 0.0 {
            if let Some(info) = outputs.get(6) {
                parse_redis_info(info, &mut payload);
            }
        }
        Ok(payload)
    }
}

/// Parses the `# Server` section of `redis-cli info`
fn parse_redis_info(output: &str, payload: &mut MetricPayload) {
    if output.contains("__unavailable__") {
        payload.set("redis.info_available", false);
        return;
    }
    let mut matched = false;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "redis_version" => {
                payload.set("redis.version", value.trim());
                matched = true;
            }
            "uptime_in_seconds" => {
                if let Ok(v) = value.trim().parse::<i64>() {
                    payload.set("redis.uptime_seconds", v);
                    matched = true;
                }
            }
            _ => {}
        }
    }
    payload.set("redis.info_available", matched);
}
