//! Collection scheduling
//!
//! One tokio task per (host, collector) pair drives periodic
//! collection. Ticks are best-effort: if the previous run for the same
//! key is still in flight, or the global concurrency limit is reached,
//! the tick is skipped rather than queued, so a slow fleet never builds
//! a backlog. Reads go through the [`ResultCache`] and never wait on
//! the network.

mod cache;

pub use cache::{CacheCell, ResultCache, SnapshotView};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::collector::Collector;
use crate::error::{MonitorError, MonitorResult};
use crate::metrics::{MetricSnapshot, SnapshotError};
use crate::platform::PlatformResolver;
use crate::pool::ConnectionPool;

/// Default cap on concurrent collection runs across the whole fleet
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Scheduler tuning knobs
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Fleet-wide cap on simultaneous collection runs
    pub max_in_flight: usize,
    /// How long shutdown waits for in-flight collection tasks before
    /// aborting them
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            shutdown_grace: Duration::from_secs(crate::pool::DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl SchedulerConfig {
    /// Overrides the concurrency cap; zero is clamped to one
    #[must_use]
    pub const fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = if max == 0 { 1 } else { max };
        self
    }

    /// Overrides the shutdown grace period
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Collectors available to the scheduler, keyed by name
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: Vec<Arc<dyn Collector>>,
}

impl CollectorRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the four built-in collectors
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for collector in [
            Arc::new(crate::collector::SystemCollector::new()) as Arc<dyn Collector>,
            Arc::new(crate::collector::WebServerCollector::new()),
            Arc::new(crate::collector::DatabaseCollector::new()),
            Arc::new(crate::collector::ProcessCollector::new()),
        ] {
            // Built-in names are distinct; registration cannot fail here
            let _ = registry.register(collector);
        }
        registry
    }

    /// Adds a collector.
    ///
    /// # Errors
    /// `DuplicateCollector` when one with the same name is already
    /// registered.
    pub fn register(&mut self, collector: Arc<dyn Collector>) -> MonitorResult<()> {
        if self.get(collector.name()).is_some() {
            return Err(MonitorError::DuplicateCollector(
                collector.name().to_string(),
            ));
        }
        self.collectors.push(collector);
        Ok(())
    }

    /// Looks up a collector by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Collector>> {
        self.collectors
            .iter()
            .find(|collector| collector.name() == name)
            .cloned()
    }

    /// Registered collector names, in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Number of registered collectors
    #[must_use]
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    /// Whether no collector is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Iterates over the registered collectors
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Collector>> {
        self.collectors.iter()
    }
}

struct SchedulerInner {
    pool: Arc<ConnectionPool>,
    resolver: Arc<PlatformResolver>,
    registry: CollectorRegistry,
    cache: ResultCache,
    limiter: Semaphore,
    shutdown_grace: Duration,
}

/// Drives periodic collection for watched hosts
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    stop: watch::Sender<bool>,
    tasks: Mutex<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl Scheduler {
    /// Creates a scheduler over the given pool and collectors.
    /// No task runs until hosts are watched.
    #[must_use]
    pub fn new(
        pool: Arc<ConnectionPool>,
        resolver: Arc<PlatformResolver>,
        registry: CollectorRegistry,
        config: SchedulerConfig,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                pool,
                resolver,
                registry,
                cache: ResultCache::new(),
                limiter: Semaphore::new(config.max_in_flight.max(1)),
                shutdown_grace: config.shutdown_grace,
            }),
            stop,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts periodic collection for one registered host.
    /// Watching an already-watched host is a no-op.
    ///
    /// # Errors
    /// `HostNotFound` when the pool does not know the host.
    pub async fn watch_host(&self, host: &str) -> MonitorResult<()> {
        // Fails early if the host was never registered with the pool
        let _ = self.inner.pool.session_state(host).await?;

        let mut tasks = self.tasks.lock().expect("task table poisoned");
        if tasks.contains_key(host) {
            tracing::debug!(host, "already watched");
            return Ok(());
        }
        let handles = self
            .inner
            .registry
            .iter()
            .map(|collector| {
                spawn_collection_task(
                    Arc::clone(&self.inner),
                    Arc::clone(collector),
                    host.to_string(),
                    self.stop.subscribe(),
                )
            })
            .collect();
        tasks.insert(host.to_string(), handles);
        tracing::info!(
            host,
            collectors = self.inner.registry.len(),
            "host watch started"
        );
        Ok(())
    }

    /// Starts watching every host currently registered with the pool.
    ///
    /// # Errors
    /// Propagates the first `watch_host` failure.
    pub async fn watch_all(&self) -> MonitorResult<()> {
        for host in self.inner.pool.host_ids() {
            self.watch_host(&host).await?;
        }
        Ok(())
    }

    /// Stops collection for a host and drops its cached results.
    /// Unknown hosts are a no-op.
    pub fn unwatch_host(&self, host: &str) {
        let handles = {
            let mut tasks = self.tasks.lock().expect("task table poisoned");
            tasks.remove(host)
        };
        if let Some(handles) = handles {
            for handle in handles {
                handle.abort();
            }
            tracing::info!(host, "host watch stopped");
        }
        self.inner.cache.remove_host(host);
        self.inner.resolver.invalidate(host);
    }

    /// Latest cached state for a key; never touches the network
    #[must_use]
    pub fn snapshot(&self, host: &str, collector: &str) -> SnapshotView {
        self.inner.cache.view(host, collector)
    }

    /// Registered collector names
    #[must_use]
    pub fn collector_names(&self) -> Vec<&str> {
        self.inner.registry.names()
    }

    /// On-demand collection for one key.
    ///
    /// A snapshot younger than the collector's TTL is returned as-is.
    /// Otherwise one collection runs now, unless another run for the
    /// same key is already in flight, in which case this call waits for
    /// that run's result instead of starting a second one.
    ///
    /// # Errors
    /// `Configuration` for an unknown collector name; pool errors when
    /// the host is unknown or the pool is shutting down.
    pub async fn refresh(&self, host: &str, collector_name: &str) -> MonitorResult<MetricSnapshot> {
        let collector = self.inner.registry.get(collector_name).ok_or_else(|| {
            MonitorError::Configuration(format!("unknown collector '{collector_name}'"))
        })?;
        let cell = self.inner.cache.cell(host, collector_name);

        if let Some(snapshot) = cell.latest() {
            if snapshot.is_fresh(collector.cache_ttl(), Utc::now()) {
                return Ok(snapshot);
            }
        }

        if let Some(generation) = cell.begin() {
            let _permit = self
                .inner
                .limiter
                .acquire()
                .await
                .map_err(|_| MonitorError::ShuttingDown)?;
            return match collect(&self.inner, collector.as_ref(), host).await {
                Err(MonitorError::ShuttingDown) => {
                    cell.abandon();
                    Err(MonitorError::ShuttingDown)
                }
                result => {
                    let snapshot = seal(result, host, collector.name(), generation);
                    cell.complete(snapshot.clone());
                    Ok(snapshot)
                }
            };
        }

        // Another run holds the key; wait for it to publish
        let deadline = Instant::now() + collector.interval().max(Duration::from_secs(1));
        while cell.is_in_flight() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cell.latest().ok_or_else(|| {
            MonitorError::Connection("concurrent collection did not complete in time".to_string())
        })
    }

    /// Graceful shutdown: stops every collection task, then drains the
    /// pool. In-flight collection runs get the configured grace period
    /// to finish; afterwards their tasks are aborted so a hung transport
    /// cannot stall shutdown. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.stop.send(true);
        let mut all_handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("task table poisoned");
            tasks.drain().flat_map(|(_, handles)| handles).collect()
        };
        let drain = futures::future::join_all(all_handles.iter_mut());
        match tokio::time::timeout(self.inner.shutdown_grace, drain).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        if !e.is_cancelled() {
                            tracing::warn!("collection task ended abnormally: {e}");
                        }
                    }
                }
            }
            Err(_) => {
                tracing::warn!(
                    stragglers = all_handles.len(),
                    "grace period elapsed; aborting collection tasks"
                );
                for handle in &all_handles {
                    handle.abort();
                }
            }
        }
        self.inner.pool.shutdown().await;
        tracing::info!("scheduler stopped");
    }
}

fn spawn_collection_task(
    inner: Arc<SchedulerInner>,
    collector: Arc<dyn Collector>,
    host: String,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(collector.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick(&inner, collector.as_ref(), &host).await;
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(host = %host, collector = collector.name(), "collection task stopped");
    })
}

/// One best-effort periodic collection attempt
async fn tick(inner: &SchedulerInner, collector: &dyn Collector, host: &str) {
    let cell = inner.cache.cell(host, collector.name());
    let Some(generation) = cell.begin() else {
        tracing::trace!(host, collector = collector.name(), "previous run still in flight");
        return;
    };
    let Ok(_permit) = inner.limiter.try_acquire() else {
        tracing::debug!(
            host,
            collector = collector.name(),
            "concurrency limit reached, skipping tick"
        );
        cell.abandon();
        return;
    };
    match collect(inner, collector, host).await {
        // Shutdown races leave the previous snapshot in place
        Err(MonitorError::ShuttingDown) => cell.abandon(),
        result => cell.complete(seal(result, host, collector.name(), generation)),
    }
}

/// Resolve platform, run the command batch, parse
async fn collect(
    inner: &SchedulerInner,
    collector: &dyn Collector,
    host: &str,
) -> MonitorResult<crate::metrics::MetricPayload> {
    let profile = inner.resolver.resolve(host).await?;
    let commands = collector.commands(&profile)?;
    let outputs = inner.pool.execute_batch(host, &commands).await?;
    collector.parse(&outputs, profile.family)
}

/// Stamps a collection result into a publishable snapshot
fn seal(
    result: MonitorResult<crate::metrics::MetricPayload>,
    host: &str,
    collector: &str,
    generation: u64,
) -> MetricSnapshot {
    if let Err(err) = &result {
        tracing::debug!(host, collector, error = %err, "collection failed");
    }
    MetricSnapshot {
        host: host.to_string(),
        collector: collector.to_string(),
        captured_at: Utc::now(),
        generation,
        result: result.map_err(|err| SnapshotError::from(&err)),
    }
}
