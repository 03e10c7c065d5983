//! Property tests for collector parse routines
//!
//! Parsers are pure functions over untrusted text, so they must never
//! panic and derived percentages must stay in range for any input.

use proptest::prelude::*;

use fleetmon_core::collector::{Collector, ProcessCollector, SystemCollector};
use fleetmon_core::platform::PlatformFamily;

proptest! {
    /// Property: arbitrary garbage never panics the system parser; it
    /// either errors or yields a payload
    #[test]
    fn system_parse_never_panics(
        sections in proptest::collection::vec(".{0,200}", 0..6),
    ) {
        let collector = SystemCollector::new();
        let _ = collector.parse(&sections, PlatformFamily::Linux);
    }

    /// Property: CPU usage derived from any stat counters stays within
    /// zero and one hundred percent
    #[test]
    fn cpu_usage_stays_in_range(
        user in 0u64..1_000_000,
        nice in 0u64..1_000_000,
        system in 0u64..1_000_000,
        idle in 0u64..1_000_000,
        iowait in 0u64..1_000_000,
    ) {
        let collector = SystemCollector::new();
        let stat = format!("cpu  {user} {nice} {system} {idle} {iowait} 0 0 0 0 0\n");
        let outputs = vec![stat, String::new(), String::new(), String::new()];
        if let Ok(payload) = collector.parse(&outputs, PlatformFamily::Linux) {
            let usage = payload.get_f64("cpu.usage_percent").expect("cpu parsed");
            prop_assert!((0.0..=100.0).contains(&usage));
        }
    }

    /// Property: load averages survive the round trip through the
    /// uptime line verbatim
    #[test]
    fn load_averages_round_trip(
        one in 0.0f64..100.0,
        five in 0.0f64..100.0,
        fifteen in 0.0f64..100.0,
    ) {
        let collector = SystemCollector::new();
        let uptime = format!(
            " 10:00:00 up 1 day, 2 users, load average: {one:.2}, {five:.2}, {fifteen:.2}\n"
        );
        let outputs = vec![String::new(), String::new(), String::new(), uptime];
        let payload = collector
            .parse(&outputs, PlatformFamily::Linux)
            .expect("load section parses");
        let parsed = payload.get_f64("load.1min").expect("load parsed");
        prop_assert!((parsed - one).abs() < 0.005 + 1e-9);
    }

    /// Property: the process parser never panics and always reports a
    /// count for every configured pattern
    #[test]
    fn process_parse_reports_every_pattern(
        table in ".{0,500}",
        patterns in proptest::collection::hash_set("[a-z]{2,8}", 1..5),
    ) {
        let patterns: Vec<String> = patterns.into_iter().collect();
        let collector = ProcessCollector::with_patterns(patterns.iter().cloned());
        let with_valid_row = format!(
            "{table}\nroot 1 0.0 0.1 1000 500 ? Ss Jan01 0:01 /sbin/init\n"
        );
        let payload = collector
            .parse(&[with_valid_row], PlatformFamily::Linux)
            .expect("at least one row parses");
        for pattern in &patterns {
            // prop_assert! stringifies its condition into a format
            // string, so the key must be bound outside the macro
            let key = format!("{pattern}.count");
            prop_assert!(payload.get(&key).is_some());
        }
    }
}
