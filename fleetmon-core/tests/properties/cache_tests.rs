//! Property tests for the result cache

use chrono::Utc;
use proptest::prelude::*;

use fleetmon_core::metrics::{MetricPayload, MetricSnapshot};
use fleetmon_core::scheduler::{ResultCache, SnapshotView};

fn snapshot(host: &str, collector: &str, generation: u64) -> MetricSnapshot {
    MetricSnapshot {
        host: host.to_string(),
        collector: collector.to_string(),
        captured_at: Utc::now(),
        generation,
        result: Ok(MetricPayload::new()),
    }
}

proptest! {
    /// Property: generations handed out by repeated begin/complete
    /// cycles are strictly increasing from one
    #[test]
    fn generations_strictly_increase(cycles in 1u64..50) {
        let cache = ResultCache::new();
        let cell = cache.cell("h1", "system");
        for expected in 1..=cycles {
            let generation = cell.begin().expect("cell should be free");
            prop_assert_eq!(generation, expected);
            cell.complete(snapshot("h1", "system", generation));
        }
    }

    /// Property: abandoning instead of completing still advances the
    /// generation and never publishes anything
    #[test]
    fn abandoned_runs_publish_nothing(abandons in 1u64..30) {
        let cache = ResultCache::new();
        let cell = cache.cell("h1", "system");
        for _ in 0..abandons {
            prop_assert!(cell.begin().is_some());
            cell.abandon();
        }
        prop_assert_eq!(cache.view("h1", "system"), SnapshotView::Pending);
        prop_assert_eq!(cell.begin(), Some(abandons + 1));
    }

    /// Property: the stored generation never decreases, whatever order
    /// completions arrive in
    #[test]
    fn stored_generation_never_decreases(
        generations in proptest::collection::vec(1u64..100, 1..20),
    ) {
        let cache = ResultCache::new();
        let cell = cache.cell("h1", "system");
        let mut highest = 0u64;
        for generation in generations {
            cell.complete(snapshot("h1", "system", generation));
            highest = highest.max(generation);
            let stored = cell.latest().expect("completed at least once");
            prop_assert_eq!(stored.generation, highest);
        }
    }

    /// Property: while a claim is held, every further begin is refused
    #[test]
    fn single_flight_holds_under_repeated_claims(attempts in 1usize..20) {
        let cache = ResultCache::new();
        let cell = cache.cell("h1", "system");
        let generation = cell.begin().expect("first claim succeeds");
        for _ in 0..attempts {
            prop_assert!(cell.begin().is_none());
        }
        cell.complete(snapshot("h1", "system", generation));
        prop_assert!(cell.begin().is_some());
    }

    /// Property: cells are fully independent across keys
    #[test]
    fn keys_do_not_interfere(hosts in proptest::collection::hash_set("[a-z]{1,8}", 1..10)) {
        let cache = ResultCache::new();
        for host in &hosts {
            let cell = cache.cell(host, "system");
            prop_assert!(cell.begin().is_some());
        }
        // Every cell is claimed; claiming any of them again fails, but
        // a fresh key is unaffected
        let fresh = cache.cell("zzzz-fresh", "system");
        prop_assert!(fresh.begin().is_some());
    }
}
