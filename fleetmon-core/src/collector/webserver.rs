//! Web server health: nginx and Apache
//!
//! Process counts establish presence; when a server is running, its
//! status endpoint (nginx `stub_status`, Apache `mod_status ?auto`)
//! is scraped from localhost for request counters. Hosts without a web
//! server still produce a valid payload with zero counts.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::{parse_count, round2, Collector};
use crate::error::{MonitorError, MonitorResult};
use crate::metrics::MetricPayload;
use crate::platform::{PlatformFamily, PlatformProfile};

/// Default polling interval
pub const DEFAULT_WEBSERVER_INTERVAL_SECS: u64 = 5;
/// Default snapshot freshness window
pub const DEFAULT_WEBSERVER_TTL_SECS: u64 = 5;

static NGINX_ACTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Active connections:\s*(\d+)").expect("static regex"));
static NGINX_COUNTERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"server accepts handled requests\s*\n\s*(\d+)\s+(\d+)\s+(\d+)")
        .expect("static regex")
});
static NGINX_QUEUES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Reading:\s*(\d+)\s*Writing:\s*(\d+)\s*Waiting:\s*(\d+)").expect("static regex")
});

/// Collects nginx and Apache service health
pub struct WebServerCollector {
    interval: Duration,
    cache_ttl: Duration,
}

impl Default for WebServerCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl WebServerCollector {
    /// Creates the collector with default cadence
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_WEBSERVER_INTERVAL_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_WEBSERVER_TTL_SECS),
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

impl Collector for WebServerCollector {
    fn name(&self) -> &str {
        "webserver"
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
        // The `|| echo` fallbacks keep every batch slot populated so the
        // outputs stay index-aligned even when a service is absent.
        Ok(vec![
            "pgrep -f 'apache2|httpd' 2>/dev/null | wc -l".to_string(),
            "pgrep -x nginx 2>/dev/null | wc -l".to_string(),
            "curl -s --max-time 2 http://localhost/server-status?auto 2>/dev/null || echo __unavailable__"
                .to_string(),
            "curl -s --max-time 2 http://localhost/nginx_status 2>/dev/null || echo __unavailable__"
                .to_string(),
            "systemctl is-active apache2 2>/dev/null || systemctl is-active httpd 2>/dev/null || echo unknown"
                .to_string(),
            "systemctl is-active nginx 2>/dev/null || echo unknown".to_string(),
        ])
    }

    fn parse(&self, outputs: &[String], _family: PlatformFamily) -> MonitorResult<MetricPayload> {
        let mut payload = MetricPayload::new();

        let apache_count = outputs.first().and_then(|o| parse_count(o));
        let nginx_count = outputs.get(1).and_then(|o| parse_count(o));
        if apache_count.is_none() && nginx_count.is_none() {
            return Err(MonitorError::Parse(
                "web server process counts missing from output".to_string(),
            ));
        }

        if let Some(count) = apache_count {
            payload.set("apache.process_count", count);
            payload.set("apache.running", count > 0);
            if count > 0 {
                if let Some(status) = outputs.get(2) {
                    parse_apache_status(status, &mut payload);
                }
            }
        } else {
            payload.mark_partial();
        }

        if let Some(count) = nginx_count {
            payload.set("nginx.process_count", count);
            payload.set("nginx.running", count > 0);
            if count > 0 {
                if let Some(status) = outputs.get(3) {
                    parse_nginx_status(status, &mut payload);
                }
            }
        } else {
            payload.mark_partial();
        }

        if let Some(state) = outputs.get(4).map(|o| o.trim()).filter(|s| !s.is_empty()) {
            payload.set("apache.service_state", state.lines().next().unwrap_or(state));
        }
        if let Some(state) = outputs.get(5).map(|o| o.trim()).filter(|s| !s.is_empty()) {
            payload.set("nginx.service_state", state.lines().next().unwrap_or(state));
        }

        Ok(payload)
    }
}

/// Parses Apache `mod_status` machine-readable output (`?auto`)
fn parse_apache_status(output: &str, payload: &mut MetricPayload) {
    if output.contains("__unavailable__") {
        payload.set("apache.status_available", false);
        return;
    }
    let mut matched = false;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Total Accesses" => {
                if let Ok(v) = value.parse::<i64>() {
                    payload.set("apache.total_accesses", v);
                    matched = true;
                }
            }
            "ReqPerSec" => {
                if let Ok(v) = value.parse::<f64>() {
                    payload.set("apache.requests_per_sec", round2(v));
                    matched = true;
                }
            }
            "BusyWorkers" => {
                if let Ok(v) = value.parse::<i64>() {
                    payload.set("apache.busy_workers", v);
                    matched = true;
                }
            }
            "IdleWorkers" => {
                if let Ok(v) = value.parse::<i64>() {
                    payload.set("apache.idle_workers", v);
                    matched = true;
                }
            }
            "Uptime" => {
                if let Ok(v) = value.parse::<i64>() {
                    payload.set("apache.uptime_seconds", v);
                    matched = true;
                }
            }
            _ => {}
        }
    }
    payload.set("apache.status_available", matched);
}

/// Parses nginx `stub_status` output
fn parse_nginx_status(output: &str, payload: &mut MetricPayload) {
    if output.contains("__unavailable__") {
        payload.set("nginx.status_available", false);
        return;
    }
    let mut matched = false;
    if let Some(caps) = NGINX_ACTIVE_RE.captures(output) {
        if let Ok(v) = caps[1].parse::<i64>() {
            payload.set("nginx.active_connections", v);
            matched = true;
        }
    }
    if let Some(caps) = NGINX_COUNTERS_RE.captures(output) {
        if let (Ok(accepts), Ok(handled), Ok(requests)) = (
            caps[1].parse::<i64>(),
            caps[2].parse::<i64>(),
            caps[3].parse::<i64>(),
        ) {
            payload.set("nginx.accepts", accepts);
            payload.set("nginx.handled", handled);
            payload.set("nginx.requests", requests);
            matched = true;
        }
    }
    if let Some(caps) = NGINX_QUEUES_RE.captures(output) {
        if let (Ok(reading), Ok(writing), Ok(waiting)) = (
            caps[1].parse::<i64>(),
            caps[2].parse::<i64>(),
            caps[3].parse::<i64>(),
        ) {
            payload.set("nginx.reading", reading);
            payload.set("nginx.writing", writing);
            payload.set("nginx.waiting", waiting);
            matched = true;
        }
    }
    payload.set("nginx.status_available", matched);
}
