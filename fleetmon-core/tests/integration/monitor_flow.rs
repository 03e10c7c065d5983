//! End-to-end collection flows over a scripted Linux host

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleetmon_core::collector::SystemCollector;
use fleetmon_core::error::{MonitorError, MonitorResult};
use fleetmon_core::host::HostIdentity;
use fleetmon_core::metrics::SnapshotErrorKind;
use fleetmon_core::platform::PlatformResolver;
use fleetmon_core::pool::transport::{Transport, TransportSession};
use fleetmon_core::pool::{ConnectionPool, PoolConfig};
use fleetmon_core::session::BackoffConfig;
use fleetmon_core::scheduler::{
    CollectorRegistry, Scheduler, SchedulerConfig, SnapshotView,
};
use fleetmon_core::testing::{batch_reply, MockTransport};

const STAT: &str = "cpu  1000 0 2000 7000 0 0 0 0 0 0\n";
const MEMINFO: &str = "MemTotal:       16384000 kB\nMemFree:         4096000 kB\n\
                       MemAvailable:    8192000 kB\n";
const DF: &str = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                  /dev/sda1 102400000 40960000 61440000 40% /\n";
const UPTIME: &str = " 10:00:00 up 40 days, 2 users, load average: 0.52, 0.61, 0.48\n";

fn linux_handler(batches: Arc<AtomicUsize>) -> impl Fn(&str) -> MonitorResult<String> {
    move |command: &str| {
        if command == "uname -s" {
            return Ok("Linux\n".to_string());
        }
        if command.contains("cat /proc/stat") {
            batches.fetch_add(1, Ordering::SeqCst);
            return Ok(batch_reply(&[STAT, MEMINFO, DF, UPTIME]));
        }
        Ok(String::new())
    }
}

fn monitor(
    transport: MockTransport,
    registry: CollectorRegistry,
) -> (Arc<ConnectionPool>, Scheduler) {
    let pool = Arc::new(ConnectionPool::new(
        Arc::new(transport),
        PoolConfig::default(),
    ));
    pool.register(HostIdentity::new("h1", "10.0.0.1"))
        .expect("fresh pool accepts registration");
    let resolver = Arc::new(PlatformResolver::new(Arc::clone(&pool)));
    let scheduler = Scheduler::new(
        Arc::clone(&pool),
        resolver,
        registry,
        SchedulerConfig::default(),
    );
    (pool, scheduler)
}

fn system_registry(interval: Duration, ttl: Duration) -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();
    registry
        .register(Arc::new(
            SystemCollector::new()
                .with_interval(interval)
                .with_cache_ttl(ttl),
        ))
        .expect("empty registry accepts system collector");
    registry
}

#[tokio::test]
async fn refresh_collects_expected_cpu_usage() {
    let batches = Arc::new(AtomicUsize::new(0));
    let transport = MockTransport::new(linux_handler(Arc::clone(&batches)));
    let (_pool, scheduler) = monitor(
        transport,
        system_registry(Duration::from_secs(60), Duration::from_secs(60)),
    );

    let snapshot = scheduler
        .refresh("h1", "system")
        .await
        .expect("collection succeeds");
    let payload = snapshot.result.expect("payload side");
    assert_eq!(payload.get_f64("cpu.usage_percent"), Some(30.0));
    assert_eq!(payload.get_f64("memory.usage_percent"), Some(50.0));
    assert_eq!(payload.get_f64("disk.usage_percent"), Some(40.0));
    assert_eq!(payload.get_f64("load.1min"), Some(0.52));
    assert!(!payload.partial);
    assert_eq!(snapshot.generation, 1);
    assert_eq!(batches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fresh_snapshot_answers_refresh_without_network() {
    let batches = Arc::new(AtomicUsize::new(0));
    let transport = MockTransport::new(linux_handler(Arc::clone(&batches)));
    let (_pool, scheduler) = monitor(
        transport,
        system_registry(Duration::from_secs(60), Duration::from_secs(60)),
    );

    let first = scheduler.refresh("h1", "system").await.expect("first run");
    let second = scheduler.refresh("h1", "system").await.expect("cached");
    assert_eq!(first.generation, second.generation);
    assert_eq!(batches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_snapshot_triggers_a_new_collection() {
    let batches = Arc::new(AtomicUsize::new(0));
    let transport = MockTransport::new(linux_handler(Arc::clone(&batches)));
    let (_pool, scheduler) = monitor(
        transport,
        system_registry(Duration::from_secs(60), Duration::from_millis(10)),
    );

    let first = scheduler.refresh("h1", "system").await.expect("first run");
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = scheduler.refresh("h1", "system").await.expect("second run");
    assert!(second.generation > first.generation);
    assert_eq!(batches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_platform_becomes_error_snapshot() {
    let transport = MockTransport::new(|command: &str| {
        if command == "uname -s" {
            Ok("SunOS\n".to_string())
        } else {
            Ok(String::new())
        }
    });
    let (_pool, scheduler) = monitor(
        transport,
        system_registry(Duration::from_secs(60), Duration::from_secs(60)),
    );

    let snapshot = scheduler
        .refresh("h1", "system")
        .await
        .expect("refresh returns the error snapshot, not Err");
    let err = snapshot.result.expect_err("no command table for SunOS");
    assert_eq!(err.kind, SnapshotErrorKind::UnsupportedPlatform);
    assert!(err.message.contains("system"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watched_host_fills_the_cache_on_its_own() {
    let batches = Arc::new(AtomicUsize::new(0));
    let transport = MockTransport::new(linux_handler(Arc::clone(&batches)));
    let (_pool, scheduler) = monitor(
        transport,
        system_registry(Duration::from_millis(50), Duration::from_millis(50)),
    );

    assert_eq!(scheduler.snapshot("h1", "system"), SnapshotView::NotFound);
    scheduler.watch_host("h1").await.expect("host is registered");

    // First tick fires immediately; give the task a moment to run it
    tokio::time::sleep(Duration::from_millis(300)).await;
    match scheduler.snapshot("h1", "system") {
        SnapshotView::Ready(snapshot) => {
            assert!(snapshot.is_ok());
            assert!(snapshot.generation >= 1);
        }
        other => panic!("expected a ready snapshot, got {other:?}"),
    }

    scheduler.unwatch_host("h1");
    assert_eq!(scheduler.snapshot("h1", "system"), SnapshotView::NotFound);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn watching_an_unknown_host_fails() {
    let (_pool, scheduler) = monitor(
        MockTransport::silent(),
        system_registry(Duration::from_secs(60), Duration::from_secs(60)),
    );
    let err = scheduler.watch_host("ghost").await.unwrap_err();
    assert!(matches!(err, MonitorError::HostNotFound(host) if host == "ghost"));
}

#[tokio::test]
async fn refreshing_an_unknown_collector_fails() {
    let (_pool, scheduler) = monitor(
        MockTransport::silent(),
        system_registry(Duration::from_secs(60), Duration::from_secs(60)),
    );
    let err = scheduler.refresh("h1", "nope").await.unwrap_err();
    assert!(matches!(err, MonitorError::Configuration(_)));
}

#[tokio::test]
async fn platform_is_redetected_after_session_reset() {
    let unames = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&unames);
    let transport = MockTransport::new(move |command: &str| {
        if command == "uname -s" {
            counter.fetch_add(1, Ordering::SeqCst);
            return Ok("Linux\n".to_string());
        }
        Ok(batch_reply(&[STAT, MEMINFO, DF, UPTIME]))
    });

    let pool = Arc::new(ConnectionPool::new(
        Arc::new(transport),
        PoolConfig::default(),
    ));
    pool.register(HostIdentity::new("h1", "10.0.0.1")).unwrap();
    let resolver = PlatformResolver::new(Arc::clone(&pool));

    resolver.resolve("h1").await.expect("first detection");
    resolver.resolve("h1").await.expect("cached");
    assert_eq!(unames.load(Ordering::SeqCst), 1);

    // Reset closes the transport and bumps the epoch; the cached
    // profile stops being trusted
    pool.reset("h1").await.expect("host exists");
    pool.execute("h1", "true").await.expect("reconnects");
    resolver.resolve("h1").await.expect("re-detection");
    assert_eq!(unames.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn platform_redetection_survives_a_failed_reconnect() {
    let unames = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&unames);
    let transport = Arc::new(MockTransport::new(move |command: &str| {
        if command == "uname -s" {
            counter.fetch_add(1, Ordering::SeqCst);
            return Ok("Linux\n".to_string());
        }
        Ok(String::new())
    }));

    let config = PoolConfig::default().with_backoff(
        BackoffConfig::new()
            .with_base_delay_ms(10)
            .with_attempts_per_call(1),
    );
    let pool = Arc::new(ConnectionPool::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        config,
    ));
    pool.register(HostIdentity::new("h1", "10.0.0.1")).unwrap();
    let resolver = PlatformResolver::new(Arc::clone(&pool));

    resolver.resolve("h1").await.expect("first detection");
    assert_eq!(unames.load(Ordering::SeqCst), 1);

    // The reconnect right after the reset fails and the session goes
    // Degraded; the epoch bump from the reset must survive that, so the
    // eventual successful reconnect still invalidates the cached profile
    pool.reset("h1").await.expect("host exists");
    transport.fail_next_connects(1);
    pool.execute("h1", "true")
        .await
        .expect_err("first reconnect is scripted to fail");
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.execute("h1", "true").await.expect("gate reopened");

    assert_eq!(pool.session_epoch("h1").await.expect("registered"), 1);
    resolver.resolve("h1").await.expect("re-detection");
    assert_eq!(unames.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn shutdown_is_bounded_when_a_command_hangs() {
    struct HangingTransport;
    struct HangingSession;

    #[async_trait::async_trait]
    impl Transport for HangingTransport {
        async fn connect(
            &self,
            _host: &HostIdentity,
        ) -> MonitorResult<Box<dyn TransportSession>> {
            Ok(Box::new(HangingSession))
        }
    }

    #[async_trait::async_trait]
    impl TransportSession for HangingSession {
        async fn run(&mut self, _command: &str) -> MonitorResult<String> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    let pool = Arc::new(ConnectionPool::new(
        Arc::new(HangingTransport),
        PoolConfig::default().with_shutdown_grace(Duration::from_millis(50)),
    ));
    pool.register(HostIdentity::new("h1", "10.0.0.1"))
        .expect("fresh pool accepts registration");
    let resolver = Arc::new(PlatformResolver::new(Arc::clone(&pool)));
    let scheduler = Scheduler::new(
        Arc::clone(&pool),
        resolver,
        system_registry(Duration::from_millis(10), Duration::from_millis(10)),
        SchedulerConfig::default().with_shutdown_grace(Duration::from_millis(100)),
    );

    scheduler.watch_host("h1").await.expect("host is registered");
    // Let the first tick enter the never-returning command
    tokio::time::sleep(Duration::from_millis(30)).await;

    tokio::time::timeout(Duration::from_secs(2), scheduler.shutdown())
        .await
        .expect("shutdown completes despite the hung command");
}

#[tokio::test]
async fn shutdown_stops_everything() {
    let (pool, scheduler) = monitor(
        MockTransport::silent(),
        system_registry(Duration::from_secs(60), Duration::from_secs(60)),
    );
    scheduler.watch_host("h1").await.expect("host is registered");
    scheduler.shutdown().await;

    assert!(matches!(
        pool.execute("h1", "true").await,
        Err(MonitorError::ShuttingDown)
    ));
    assert!(matches!(
        pool.register(HostIdentity::new("h2", "10.0.0.2")),
        Err(MonitorError::ShuttingDown)
    ));
}
