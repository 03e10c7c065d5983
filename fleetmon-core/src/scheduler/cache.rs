//! Freshness cache for collection results
//!
//! One cell per (host, collector) pair. The cell carries the latest
//! snapshot plus two atomics: an in-flight flag that makes collection
//! single-flight per key, and a monotonic generation counter that
//! rejects out-of-order completions. Readers never block on collection;
//! they get the last complete snapshot or a pending marker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::metrics::MetricSnapshot;

/// What a synchronous cache read can observe
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotView {
    /// The (host, collector) pair is not scheduled
    NotFound,
    /// Scheduled, but no collection has completed yet
    Pending,
    /// Latest complete snapshot; check `is_fresh` for staleness
    Ready(MetricSnapshot),
}

/// One (host, collector) slot
pub struct CacheCell {
    snapshot: RwLock<Option<MetricSnapshot>>,
    in_flight: AtomicBool,
    generation: AtomicU64,
}

impl CacheCell {
    fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Claims the cell for one collection run.
    ///
    /// Returns the generation to stamp on the resulting snapshot, or
    /// `None` when another run is already in flight for this key.
    pub fn begin(&self) -> Option<u64> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        Some(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Publishes a finished snapshot and releases the claim.
    ///
    /// A snapshot older than the one already stored is dropped; the
    /// generation stamp, not arrival order, decides.
    pub fn complete(&self, snapshot: MetricSnapshot) {
        {
            let mut slot = self.snapshot.write().expect("snapshot cell poisoned");
            let newer = slot
                .as_ref()
                .is_none_or(|current| snapshot.generation > current.generation);
            if newer {
                *slot = Some(snapshot);
            } else {
                tracing::debug!(
                    host = %snapshot.host,
                    collector = %snapshot.collector,
                    generation = snapshot.generation,
                    "dropping out-of-order snapshot"
                );
            }
        }
        self.in_flight.store(false, Ordering::Release);
    }

    /// Releases the claim without publishing (run aborted before it
    /// produced a snapshot)
    pub fn abandon(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    /// Whether a collection run currently holds the cell
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Latest snapshot, if any collection has completed
    #[must_use]
    pub fn latest(&self) -> Option<MetricSnapshot> {
        self.snapshot.read().expect("snapshot cell poisoned").clone()
    }
}

/// All cells, keyed by (host id, collector name)
#[derive(Default)]
pub struct ResultCache {
    // Outer lock guards the map structure only; cell contents have
    // their own synchronization.
    cells: RwLock<HashMap<(String, String), Arc<CacheCell>>>,
}

impl ResultCache {
    /// Creates an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell for a key, creating it on first use
    pub fn cell(&self, host: &str, collector: &str) -> Arc<CacheCell> {
        {
            let cells = self.cells.read().expect("cache map poisoned");
            if let Some(cell) = cells.get(&(host.to_string(), collector.to_string())) {
                return Arc::clone(cell);
            }
        }
        let mut cells = self.cells.write().expect("cache map poisoned");
        Arc::clone(
            cells
                .entry((host.to_string(), collector.to_string()))
                .or_insert_with(|| Arc::new(CacheCell::new())),
        )
    }

    /// Synchronous read of the latest state for a key
    #[must_use]
    pub fn view(&self, host: &str, collector: &str) -> SnapshotView {
        let cells = self.cells.read().expect("cache map poisoned");
        let Some(cell) = cells.get(&(host.to_string(), collector.to_string())) else {
            return SnapshotView::NotFound;
        };
        match cell.latest() {
            Some(snapshot) => SnapshotView::Ready(snapshot),
            None => SnapshotView::Pending,
        }
    }

    /// Drops every cell belonging to a host
    pub fn remove_host(&self, host: &str) {
        let mut cells = self.cells.write().expect("cache map poisoned");
        cells.retain(|(cell_host, _), _| cell_host != host);
    }

    /// Number of live cells
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.read().expect("cache map poisoned").len()
    }

    /// Whether the cache holds no cells
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
