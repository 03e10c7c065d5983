//! Platform detection and per-family command tables
//!
//! One `uname -s` round trip classifies the host; the resulting
//! [`PlatformProfile`] maps metric categories to the command strings that
//! work on that family. The result is cached per host for the session's
//! lifetime and re-resolved only after the session cycled through
//! `Closed` (epoch change), since the machine behind an address could
//! have been replaced.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::MonitorResult;
use crate::pool::ConnectionPool;

/// Identification command sent once per session
pub const UNAME_COMMAND: &str = "uname -s";

/// Operating-system family of a monitored host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PlatformFamily {
    /// Linux (reads `/proc/*`)
    Linux,
    /// FreeBSD
    FreeBsd,
    /// OpenBSD
    OpenBsd,
    /// macOS / Darwin
    MacOs,
    /// Unrecognized uname output; empty command table
    Unknown,
}

impl PlatformFamily {
    /// Classifies `uname -s` output, case-insensitively
    #[must_use]
    pub fn from_uname(output: &str) -> Self {
        let lower = output.trim().to_ascii_lowercase();
        if lower.contains("linux") {
            Self::Linux
        } else if lower.contains("freebsd") {
            Self::FreeBsd
        } else if lower.contains("openbsd") {
            Self::OpenBsd
        } else if lower.contains("darwin") {
            Self::MacOs
        } else {
            Self::Unknown
        }
    }

    /// Stable name used in logs and error snapshots
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::FreeBsd => "FreeBSD",
            Self::OpenBsd => "OpenBSD",
            Self::MacOs => "macOS",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of diagnostic command a collector can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricCategory {
    /// CPU time counters or usage summary
    CpuUsage,
    /// Physical memory and swap
    MemoryInfo,
    /// Filesystem usage
    DiskUsage,
    /// Load averages
    LoadAverage,
    /// Full process table
    ProcessList,
}

/// Detected family plus its command table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProfile {
    /// The detected family
    pub family: PlatformFamily,
}

impl PlatformProfile {
    /// Creates a profile for the given family
    #[must_use]
    pub const fn new(family: PlatformFamily) -> Self {
        Self { family }
    }

    /// Looks up the command string for a metric category.
    ///
    /// `None` means the category is unsupported on this family; callers
    /// degrade to an `UnsupportedPlatform` snapshot instead of failing
    /// the whole collection run.
    #[must_use]
    pub const fn command(&self, category: MetricCategory) -> Option<&'static str> {
        use MetricCategory as C;
        use PlatformFamily as F;
        match (self.family, category) {
            (F::Linux, C::CpuUsage) => Some("cat /proc/stat"),
            (F::Linux, C::MemoryInfo) => Some("cat /proc/meminfo"),
            (F::Linux, C::ProcessList) => Some("ps aux --no-headers"),
            (F::FreeBsd | F::OpenBsd, C::CpuUsage) => Some("top -b -n 1"),
            (F::FreeBsd | F::OpenBsd, C::MemoryInfo) => {
                Some("sysctl -n hw.physmem hw.usermem vm.stats.vm.v_free_count")
            }
            (F::MacOs, C::CpuUsage) => Some("top -l 1 -n 0"),
            (F::MacOs, C::MemoryInfo) => Some("vm_stat"),
            (F::FreeBsd | F::OpenBsd | F::MacOs, C::ProcessList) => Some("ps aux"),
            // Portable across every supported family
            (F::Linux | F::FreeBsd | F::OpenBsd | F::MacOs, C::DiskUsage) => Some("df -Pk"),
            (F::Linux | F::FreeBsd | F::OpenBsd | F::MacOs, C::LoadAverage) => Some("uptime"),
            (F::Unknown, _) => None,
        }
    }
}

/// Resolves and caches platform profiles per host
pub struct PlatformResolver {
    pool: Arc<ConnectionPool>,
    // host id -> (session epoch at detection time, profile)
    cache: RwLock<HashMap<String, (u64, PlatformProfile)>>,
}

impl PlatformResolver {
    /// Creates a resolver over the given pool
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the host's platform profile, detecting it on first use.
    ///
    /// Re-detects iff the session epoch changed since the cached entry
    /// was recorded.
    ///
    /// # Errors
    /// Propagates pool errors from the identification round trip.
    pub async fn resolve(&self, host: &str) -> MonitorResult<PlatformProfile> {
        let epoch = self.pool.session_epoch(host).await?;
        {
            let cache = self.cache.read().expect("platform cache poisoned");
            if let Some((cached_epoch, profile)) = cache.get(host) {
                if *cached_epoch == epoch {
                    return Ok(*profile);
                }
            }
        }

        let output = self.pool.execute(host, UNAME_COMMAND).await?;
        let family = PlatformFamily::from_uname(&output);
        if family == PlatformFamily::Unknown {
            tracing::warn!(host, uname = %output.trim(), "unrecognized platform");
        } else {
            tracing::debug!(host, family = %family, "platform detected");
        }

        // Key by the epoch observed before the round trip; a reset racing
        // this detection just causes one extra re-resolve later.
        let profile = PlatformProfile::new(family);
        let mut cache = self.cache.write().expect("platform cache poisoned");
        cache.insert(host.to_string(), (epoch, profile));
        Ok(profile)
    }

    /// Drops the cached profile for a host (used when the host is removed)
    pub fn invalidate(&self, host: &str) {
        let mut cache = self.cache.write().expect("platform cache poisoned");
        cache.remove(host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_uname() {
        assert_eq!(PlatformFamily::from_uname("Linux\n"), PlatformFamily::Linux);
        assert_eq!(
            PlatformFamily::from_uname("FreeBSD"),
            PlatformFamily::FreeBsd
        );
        assert_eq!(
            PlatformFamily::from_uname("OpenBSD"),
            PlatformFamily::OpenBsd
        );
        assert_eq!(PlatformFamily::from_uname("Darwin"), PlatformFamily::MacOs);
        assert_eq!(
            PlatformFamily::from_uname("SunOS"),
            PlatformFamily::Unknown
        );
        assert_eq!(PlatformFamily::from_uname(""), PlatformFamily::Unknown);
    }

    #[test]
    fn test_unknown_family_has_empty_table() {
        let profile = PlatformProfile::new(PlatformFamily::Unknown);
        for category in [
            MetricCategory::CpuUsage,
            MetricCategory::MemoryInfo,
            MetricCategory::DiskUsage,
            MetricCategory::LoadAverage,
            MetricCategory::ProcessList,
        ] {
            assert!(profile.command(category).is_none());
        }
    }

    #[test]
    fn test_linux_table_reads_proc() {
        let profile = PlatformProfile::new(PlatformFamily::Linux);
        assert_eq!(
            profile.command(MetricCategory::CpuUsage),
            Some("cat /proc/stat")
        );
        assert_eq!(profile.command(MetricCategory::DiskUsage), Some("df -Pk"));
    }

    #[test]
    fn test_macos_uses_vm_stat() {
        let profile = PlatformProfile::new(PlatformFamily::MacOs);
        assert_eq!(profile.command(MetricCategory::MemoryInfo), Some("vm_stat"));
    }
}
