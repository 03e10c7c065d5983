//! Property tests for reconnect backoff behavior

use proptest::prelude::*;
use std::time::{Duration, Instant};

use fleetmon_core::session::{BackoffConfig, BackoffState};

proptest! {
    /// Property: the delay never exceeds the configured cap
    #[test]
    fn delay_never_exceeds_cap(
        base in 1u64..10_000,
        cap in 1u64..60_000,
        failures in 0u32..100,
    ) {
        let config = BackoffConfig::new()
            .with_base_delay_ms(base)
            .with_max_delay_ms(cap);
        prop_assert!(config.delay_after(failures) <= Duration::from_millis(cap));
    }

    /// Property: with a multiplier above one the delay is non-decreasing
    /// in the failure count
    #[test]
    fn delay_is_monotonic(
        base in 1u64..5_000,
        failures in 1u32..60,
    ) {
        let config = BackoffConfig::new()
            .with_base_delay_ms(base)
            .with_max_delay_ms(u64::MAX / 2)
            .with_multiplier(2.0);
        prop_assert!(config.delay_after(failures + 1) >= config.delay_after(failures));
    }

    /// Property: zero failures always means zero delay
    #[test]
    fn no_failures_no_delay(base in 1u64..100_000) {
        let config = BackoffConfig::new().with_base_delay_ms(base);
        prop_assert_eq!(config.delay_after(0), Duration::ZERO);
    }

    /// Property: after any failure sequence the gate is closed at the
    /// instant of the last failure and open after the returned delay
    #[test]
    fn gate_closed_until_delay_elapses(
        base in 1u64..1_000,
        failures in 1usize..20,
    ) {
        let mut state = BackoffState::new(
            BackoffConfig::new().with_base_delay_ms(base),
        );
        let now = Instant::now();
        let mut last_delay = Duration::ZERO;
        for i in 0..failures {
            last_delay = state.record_failure(now, format!("failure {i}"));
        }
        prop_assert!(state.is_gated(now));
        prop_assert!(!state.is_gated(now + last_delay));
        prop_assert!(state.remaining(now) <= last_delay);
    }

    /// Property: one success wipes the failure history completely,
    /// whatever preceded it
    #[test]
    fn success_always_resets(failures in 0usize..50) {
        let mut state = BackoffState::new(BackoffConfig::new());
        let now = Instant::now();
        for i in 0..failures {
            state.record_failure(now, format!("failure {i}"));
        }
        state.record_success();
        prop_assert_eq!(state.consecutive_failures(), 0);
        prop_assert!(state.deadline().is_none());
        prop_assert!(!state.is_gated(now));
    }

    /// Property: the failure counter tracks the number of recorded
    /// failures exactly
    #[test]
    fn failure_counter_is_exact(failures in 0u32..200) {
        let mut state = BackoffState::new(BackoffConfig::new());
        let now = Instant::now();
        for i in 0..failures {
            state.record_failure(now, format!("failure {i}"));
        }
        prop_assert_eq!(state.consecutive_failures(), failures);
    }
}
