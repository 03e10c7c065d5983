//! Pool behavior under failures: backoff gating, auth rejection,
//! batch atomicity, shutdown

use std::sync::Arc;
use std::time::Duration;

use fleetmon_core::error::MonitorError;
use fleetmon_core::host::HostIdentity;
use fleetmon_core::pool::transport::Transport;
use fleetmon_core::pool::{ConnectionPool, PoolConfig};
use fleetmon_core::session::{BackoffConfig, SessionState};
use fleetmon_core::testing::{batch_reply, truncated_batch_reply, MockTransport};

fn fast_backoff() -> PoolConfig {
    PoolConfig::default().with_backoff(
        BackoffConfig::new()
            .with_base_delay_ms(10)
            .with_max_delay_ms(100)
            .with_attempts_per_call(3),
    )
}

fn pool_with(transport: MockTransport, config: PoolConfig) -> (Arc<MockTransport>, ConnectionPool) {
    let transport = Arc::new(transport);
    let pool = ConnectionPool::new(Arc::clone(&transport) as Arc<dyn Transport>, config);
    pool.register(HostIdentity::new("h1", "10.0.0.1"))
        .expect("fresh pool accepts registration");
    (transport, pool)
}

#[tokio::test]
async fn connect_retries_within_one_call_then_succeeds() {
    let (transport, pool) = pool_with(MockTransport::silent().failing_connects(2), fast_backoff());

    pool.execute("h1", "true").await.expect("third attempt connects");
    assert_eq!(transport.connect_count(), 3);
    assert_eq!(
        pool.session_state("h1").await.expect("registered"),
        SessionState::Ready
    );
}

#[tokio::test]
async fn exhausted_attempts_close_the_backoff_gate() {
    let (transport, pool) = pool_with(MockTransport::silent().failing_connects(3), fast_backoff());

    let err = pool.execute("h1", "true").await.unwrap_err();
    assert!(matches!(err, MonitorError::Connection(_)));
    assert_eq!(transport.connect_count(), 3);
    assert_eq!(
        pool.session_state("h1").await.expect("registered"),
        SessionState::Degraded
    );

    // Arriving before the deadline fails fast with zero network activity
    let err = pool.execute("h1", "true").await.unwrap_err();
    let MonitorError::Connection(message) = err else {
        panic!("expected a connection error");
    };
    assert!(message.contains("backoff gate closed"), "{message}");
    assert_eq!(transport.connect_count(), 3);

    // Once the gate opens the pool connects again
    tokio::time::sleep(Duration::from_millis(120)).await;
    pool.execute("h1", "true").await.expect("gate reopened");
    assert_eq!(transport.connect_count(), 4);
}

#[tokio::test]
async fn auth_rejection_is_terminal_without_reconnects() {
    let (transport, pool) = pool_with(MockTransport::silent().rejecting_auth(), fast_backoff());

    assert!(matches!(
        pool.execute("h1", "true").await,
        Err(MonitorError::Auth(_))
    ));
    assert_eq!(
        pool.session_state("h1").await.expect("registered"),
        SessionState::AuthFailed
    );

    // No further connect attempts; the failure is reported immediately
    assert!(matches!(
        pool.execute("h1", "true").await,
        Err(MonitorError::Auth(_))
    ));
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test]
async fn batch_outputs_come_back_in_request_order() {
    let (_transport, pool) = pool_with(
        MockTransport::new(|_| Ok(batch_reply(&["alpha", "beta\nbeta2", "gamma"]))),
        PoolConfig::default(),
    );

    let commands = vec!["c0".to_string(), "c1".to_string(), "c2".to_string()];
    let outputs = pool.execute_batch("h1", &commands).await.expect("batch runs");
    assert_eq!(outputs, vec!["alpha", "beta\nbeta2", "gamma"]);
}

#[tokio::test]
async fn dropped_session_fails_the_whole_batch() {
    let (_transport, pool) = pool_with(
        MockTransport::new(|_| Ok(truncated_batch_reply(&["alpha", "beta", "gamma"], 2))),
        PoolConfig::default(),
    );

    let commands = vec!["c0".to_string(), "c1".to_string(), "c2".to_string()];
    let err = pool.execute_batch("h1", &commands).await.unwrap_err();
    // Atomic: no partial vector escapes, the caller sees one failure
    assert!(matches!(err, MonitorError::Connection(_)));
}

#[tokio::test]
async fn empty_batch_never_touches_the_network() {
    let (transport, pool) = pool_with(MockTransport::silent(), PoolConfig::default());
    let outputs = pool.execute_batch("h1", &[]).await.expect("trivial batch");
    assert!(outputs.is_empty());
    assert_eq!(transport.connect_count(), 0);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let (_transport, pool) = pool_with(MockTransport::silent(), PoolConfig::default());
    let err = pool
        .register(HostIdentity::new("h1", "10.9.9.9"))
        .unwrap_err();
    assert!(matches!(err, MonitorError::Configuration(_)));
    assert_eq!(pool.host_ids(), vec!["h1".to_string()]);
}

#[tokio::test]
async fn remove_closes_the_transport_and_is_idempotent() {
    let (transport, pool) = pool_with(MockTransport::silent(), PoolConfig::default());
    pool.execute("h1", "true").await.expect("connects");

    pool.remove("h1").await;
    assert_eq!(transport.close_count(), 1);
    assert!(pool.host_ids().is_empty());

    // Second removal is a no-op
    pool.remove("h1").await;
    assert_eq!(transport.close_count(), 1);

    assert!(matches!(
        pool.execute("h1", "true").await,
        Err(MonitorError::HostNotFound(_))
    ));
}

#[tokio::test]
async fn commands_against_different_hosts_run_independently() {
    let transport = Arc::new(MockTransport::new(|command: &str| Ok(command.to_string())));
    let pool = Arc::new(ConnectionPool::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        PoolConfig::default(),
    ));
    pool.register(HostIdentity::new("h1", "10.0.0.1")).unwrap();
    pool.register(HostIdentity::new("h2", "10.0.0.2")).unwrap();

    let a = pool.execute("h1", "echo one");
    let b = pool.execute("h2", "echo two");
    let (a, b) = tokio::join!(a, b);
    assert_eq!(a.expect("h1 runs"), "echo one");
    assert_eq!(b.expect("h2 runs"), "echo two");
    assert_eq!(transport.connect_count(), 2);
}
