//! System metrics: CPU, memory, disk, load average
//!
//! One batch of four commands per tick. Each section is parsed
//! independently; a section that fails to parse is dropped and the
//! payload marked partial, so a noisy `df` never hides a good CPU
//! reading.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::{round2, Collector};
use crate::error::{MonitorError, MonitorResult};
use crate::metrics::MetricPayload;
use crate::platform::{MetricCategory, PlatformFamily, PlatformProfile};

/// Default polling interval
pub const DEFAULT_SYSTEM_INTERVAL_SECS: u64 = 2;
/// Default snapshot freshness window
pub const DEFAULT_SYSTEM_TTL_SECS: u64 = 2;

static LOAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"load averages?:\s*([\d.]+)[,\s]+([\d.]+)[,\s]+([\d.]+)").expect("static regex")
});
static BSD_CPU_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"CPU:\s*([\d.]+)%\s*user.*?([\d.]+)%\s*idle").expect("static regex")
});
static MAC_CPU_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"CPU usage:\s*([\d.]+)%\s*user,\s*([\d.]+)%\s*sys,\s*([\d.]+)%\s*idle")
        .expect("static regex")
});
static VM_STAT_PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"page size of (\d+) bytes").expect("static regex"));

/// Collects baseline host health
pub struct SystemCollector {
    interval: Duration,
    cache_ttl: Duration,
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCollector {
    /// Creates the collector with default cadence
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SYSTEM_INTERVAL_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_SYSTEM_TTL_SECS),
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

impl Collector for SystemCollector {
    fn name(&self) -> &str {
        "system"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    fn commands(&self, profile: &PlatformProfile) -> MonitorResult<Vec<String>> {
        let categories = [
            MetricCategory::CpuUsage,
            MetricCategory::MemoryInfo,
            MetricCategory::DiskUsage,
            MetricCategory::LoadAverage,
        ];
        categories
            .iter()
            .map(|&category| {
                profile.command(category).map(str::to_string).ok_or_else(|| {
                    MonitorError::UnsupportedPlatform {
                        collector: self.name().to_string(),
                        family: profile.family.as_str().to_string(),
                    }
                })
            })
            .collect()
    }

    fn parse(&self, outputs: &[String], family: PlatformFamily) -> MonitorResult<MetricPayload> {
        let mut payload = MetricPayload::new();
        let mut failed = 0_u32;

        let sections: [(&str, fn(&str, PlatformFamily, &mut MetricPayload) -> bool); 4] = [
            ("cpu", parse_cpu),
            ("memory", parse_memory),
            ("disk", parse_disk),
            ("load", parse_load),
        ];
        for (index, (label, parser)) in sections.iter().enumerate() {
            let parsed = outputs
                .get(index)
                .is_some_and(|output| parser(output, family, &mut payload));
            if !parsed {
                tracing::debug!(section = label, "system section did not parse");
                failed += 1;
            }
        }

        if failed as usize == sections.len() {
            return Err(MonitorError::Parse(
                "no system metric section matched the expected shape".to_string(),
            ));
        }
        if failed > 0 {
            payload.mark_partial();
        }
        Ok(payload)
    }
}

fn parse_cpu(output: &str, family: PlatformFamily, payload: &mut MetricPayload) -> bool {
    match family {
        PlatformFamily::Linux => parse_proc_stat(output, payload),
        PlatformFamily::FreeBsd | PlatformFamily::OpenBsd => parse_bsd_top(output, payload),
        PlatformFamily::MacOs => parse_mac_top(output, payload),
        PlatformFamily::Unknown => false,
    }
}

/// Single-sample usage from the aggregate `cpu` line of `/proc/stat`:
/// the busy share of all time accumulated since boot, with iowait
/// counted as idle.
fn parse_proc_stat(output: &str, payload: &mut MetricPayload) -> bool {
    let Some(line) = output
        .lines()
        .find(|line| line.starts_with("cpu ") || line.starts_with("cpu\t"))
    else {
        return false;
    };
    let ticks: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(7)
        .filter_map(|field| field.parse().ok())
        .collect();
    if ticks.len() < 5 {
        return false;
    }
    let total: u64 = ticks.iter().sum();
    if total == 0 {
        return false;
    }
    let idle_total = ticks[3] + ticks[4];
    let busy = total - idle_total;
    let usage = busy as f64 / total as f64 * 100.0;
    payload.set("cpu.usage_percent", round2(usage));
    payload.set("cpu.user_ticks", ticks[0]);
    payload.set("cpu.system_ticks", ticks[2]);
    payload.set("cpu.idle_ticks", ticks[3]);
    payload.set("cpu.iowait_ticks", ticks[4]);
    true
}

fn parse_bsd_top(output: &str, payload: &mut MetricPayload) -> bool {
    let Some(caps) = BSD_CPU_RE.captures(output) else {
        return false;
    };
    let (Ok(user), Ok(idle)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) else {
        return false;
    };
    payload.set("cpu.usage_percent", round2(100.0 - idle));
    payload.set("cpu.user_percent", round2(user));
    payload.set("cpu.idle_percent", round2(idle));
    true
}

fn parse_mac_top(output: &str, payload: &mut MetricPayload) -> bool {
    let Some(caps) = MAC_CPU_RE.captures(output) else {
        return false;
    };
    let (Ok(user), Ok(sys), Ok(idle)) = (
        caps[1].parse::<f64>(),
        caps[2].parse::<f64>(),
        caps[3].parse::<f64>(),
    ) else {
        return false;
    };
    payload.set("cpu.usage_percent", round2(user + sys));
    payload.set("cpu.user_percent", round2(user));
    payload.set("cpu.system_percent", round2(sys));
    payload.set("cpu.idle_percent", round2(idle));
    true
}

fn parse_memory(output: &str, family: PlatformFamily, payload: &mut MetricPayload) -> bool {
    match family {
        PlatformFamily::Linux => parse_meminfo(output, payload),
        PlatformFamily::FreeBsd | PlatformFamily::OpenBsd => parse_sysctl_mem(output, payload),
        PlatformFamily::MacOs => parse_vm_stat(output, payload),
        PlatformFamily::Unknown => false,
    }
}

fn meminfo_kib(output: &str, key: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

fn parse_meminfo(output: &str, payload: &mut MetricPayload) -> bool {
    let Some(total) = meminfo_kib(output, "MemTotal") else {
        return false;
    };
    let Some(available) = meminfo_kib(output, "MemAvailable") else {
        return false;
    };
    let used = total.saturating_sub(available);
    payload.set("memory.total_kib", total);
    payload.set("memory.available_kib", available);
    payload.set("memory.used_kib", used);
    if total > 0 {
        payload.set(
            "memory.usage_percent",
            round2(used as f64 / total as f64 * 100.0),
        );
    }
    if let Some(free) = meminfo_kib(output, "MemFree") {
        payload.set("memory.free_kib", free);
    }
    if let (Some(swap_total), Some(swap_free)) = (
        meminfo_kib(output, "SwapTotal"),
        meminfo_kib(output, "SwapFree"),
    ) {
        payload.set("memory.swap_total_kib", swap_total);
        payload.set("memory.swap_used_kib", swap_total.saturating_sub(swap_free));
    }
    true
}

/// `sysctl -n` prints one value per line in query order: physmem,
/// usermem, free page count.
fn parse_sysctl_mem(output: &str, payload: &mut MetricPayload) -> bool {
    let values: Vec<u64> = output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    let [physmem, _usermem, free_pages, ..] = values[..] else {
        return false;
    };
    // BSD reports pages of 4 KiB through vm.stats
    let free = free_pages * 4096;
    let used = physmem.saturating_sub(free);
    payload.set("memory.total_kib", physmem / 1024);
    payload.set("memory.used_kib", used / 1024);
    payload.set("memory.free_kib", free / 1024);
    if physmem > 0 {
        payload.set(
            "memory.usage_percent",
            round2(used as f64 / physmem as f64 * 100.0),
        );
    }
    true
}

fn vm_stat_pages(output: &str, key: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(key)?.strip_prefix(':')?;
        rest.trim().trim_end_matches('.').parse().ok()
    })
}

fn parse_vm_stat(output: &str, payload: &mut MetricPayload) -> bool {
    let page_size: u64 = VM_STAT_PAGE_RE
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(4096);
    let Some(free) = vm_stat_pages(output, "Pages free") else {
        return false;
    };
    let active = vm_stat_pages(output, "Pages active").unwrap_or(0);
    let inactive = vm_stat_pages(output, "Pages inactive").unwrap_or(0);
    let wired = vm_stat_pages(output, "Pages wired down").unwrap_or(0);
    let used = (active + wired) * page_size;
    let total = (free + active + inactive + wired) * page_size;
    payload.set("memory.total_kib", total / 1024);
    payload.set("memory.used_kib", used / 1024);
    payload.set("memory.free_kib", free * page_size / 1024);
    if total > 0 {
        payload.set(
            "memory.usage_percent",
            round2(used as f64 / total as f64 * 100.0),
        );
    }
    true
}

/// Parses `df -Pk` and reports the root filesystem plus a mount count.
/// Pseudo filesystems are skipped.
fn parse_disk(output: &str, _family: PlatformFamily, payload: &mut MetricPayload) -> bool {
    let mut mounts = 0_i64;
    let mut root: Option<(u64, u64, u64, f64)> = None;
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [device, total, used, available, capacity, mount, ..] = fields[..] else {
            continue;
        };
        if device.starts_with("tmpfs")
            || device.starts_with("devfs")
            || device.starts_with("proc")
            || device.starts_with("sysfs")
            || device.starts_with("overlay")
        {
            continue;
        }
        let (Ok(total), Ok(used), Ok(available)) = (
            total.parse::<u64>(),
            used.parse::<u64>(),
            available.parse::<u64>(),
        ) else {
            continue;
        };
        let Ok(capacity) = capacity.trim_end_matches('%').parse::<f64>() else {
            continue;
        };
        mounts += 1;
        if mount == "/" {
            root = Some((total, used, available, capacity));
        }
    }
    if mounts == 0 {
        return false;
    }
    payload.set("disk.filesystems", mounts);
    if let Some((total, used, available, capacity)) = root {
        payload.set("disk.total_kib", total);
        payload.set("disk.used_kib", used);
        payload.set("disk.available_kib", available);
        payload.set("disk.usage_percent", round2(capacity));
    }
    true
}

fn parse_load(output: &str, _family: PlatformFamily, payload: &mut MetricPayload) -> bool {
    let Some(caps) = LOAD_RE.captures(output) else {
        return false;
    };
    let (Ok(one), Ok(five), Ok(fifteen)) = (
        caps[1].parse::<f64>(),
        caps[2].parse::<f64>(),
        caps[3].parse::<f64>(),
    ) else {
        return false;
    };
    payload.set("load.1min", one);
    payload.set("load.5min", five);
    payload.set("load.15min", fifteen);
    true
}
