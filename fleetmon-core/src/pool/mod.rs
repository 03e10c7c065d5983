//! Connection pool
//!
//! Owns exactly one [`Session`] per registered host. Commands against
//! different hosts run fully in parallel; commands against the same host
//! are serialized through that session's lock so output never interleaves.
//! Reconnects are driven here, gated by the session's shared backoff
//! deadline.

pub mod transport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::{MonitorError, MonitorResult};
use crate::host::HostIdentity;
use crate::session::{BackoffConfig, Session, SessionState};
use transport::Transport;

/// Marker prefix echoed before each command in a batch
const BATCH_MARKER_PREFIX: &str = "___FLEETMON_CMD_";

/// Marker echoed after the last command; its absence means the session
/// dropped mid-batch and the whole call fails
const BATCH_END_MARKER: &str = "___FLEETMON_BATCH_END___";

/// Default grace period for in-flight commands during shutdown
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Pool-level configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Reconnect backoff policy applied to every session
    pub backoff: BackoffConfig,
    /// How long shutdown waits for an in-flight command before abandoning
    /// its transport
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl PoolConfig {
    /// Overrides the backoff policy
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Overrides the shutdown grace period
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Pool of per-host sessions with reconnection and batch execution
pub struct ConnectionPool {
    transport: Arc<dyn Transport>,
    config: PoolConfig,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Creates an empty pool over the given transport
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: PoolConfig) -> Self {
        Self {
            transport,
            config,
            sessions: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Registers a host, creating its session in `Disconnected` state.
    ///
    /// Does not touch the network; the first connect happens on first use.
    ///
    /// # Errors
    /// `Configuration` if the host id is already registered,
    /// `ShuttingDown` after [`Self::shutdown`].
    pub fn register(&self, identity: HostIdentity) -> MonitorResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MonitorError::ShuttingDown);
        }
        let mut sessions = self.sessions.write().expect("session map poisoned");
        if sessions.contains_key(&identity.id) {
            return Err(MonitorError::Configuration(format!(
                "host '{}' is already registered",
                identity.id
            )));
        }
        tracing::info!(host = %identity.id, address = %identity.address, "host registered");
        let session = Session::new(identity.clone(), self.config.backoff.clone());
        sessions.insert(identity.id, Arc::new(Mutex::new(session)));
        Ok(())
    }

    /// Removes a host and closes its transport. Idempotent.
    pub async fn remove(&self, host: &str) {
        let slot = {
            let mut sessions = self.sessions.write().expect("session map poisoned");
            sessions.remove(host)
        };
        if let Some(slot) = slot {
            let mut session = slot.lock().await;
            if let Some(mut t) = session.take_transport(SessionState::Closed) {
                t.close().await;
            }
            tracing::info!(host, "host removed");
        }
    }

    /// Closes a host's transport and marks the session `Closed`.
    ///
    /// Closing bumps the session epoch, which invalidates the cached
    /// platform profile: the machine behind this address is no longer
    /// trusted to be the same. The next command reconnects.
    ///
    /// # Errors
    /// `HostNotFound` for an unregistered id.
    pub async fn reset(&self, host: &str) -> MonitorResult<()> {
        let slot = self.slot(host)?;
        let mut session = slot.lock().await;
        if let Some(mut t) = session.take_transport(SessionState::Closed) {
            t.close().await;
        }
        tracing::debug!(host, "session reset");
        Ok(())
    }

    /// Registered host ids
    #[must_use]
    pub fn host_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().expect("session map poisoned");
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current state of a host's session
    ///
    /// # Errors
    /// `HostNotFound` for an unregistered id.
    pub async fn session_state(&self, host: &str) -> MonitorResult<SessionState> {
        let slot = self.slot(host)?;
        let session = slot.lock().await;
        Ok(session.state())
    }

    /// Detection epoch of a host's session (see [`Session::epoch`])
    ///
    /// # Errors
    /// `HostNotFound` for an unregistered id.
    pub async fn session_epoch(&self, host: &str) -> MonitorResult<u64> {
        let slot = self.slot(host)?;
        let session = slot.lock().await;
        Ok(session.epoch())
    }

    /// Runs one command on a host and returns its stdout.
    ///
    /// Reconnects first when the session is down, within the bounded
    /// per-call attempt budget; a backoff deadline set by an earlier
    /// failure makes the call fail immediately instead.
    ///
    /// # Errors
    /// `Connection` after retries are exhausted or while the backoff gate
    /// is closed, `Auth` when credentials are rejected, `HostNotFound`,
    /// `ShuttingDown`.
    pub async fn execute(&self, host: &str, command: &str) -> MonitorResult<String> {
        self.run_on_session(host, command).await
    }

    /// Runs several commands as one logical round trip.
    ///
    /// Outputs come back in request order. The batch fails atomically: if
    /// the session drops mid-batch the caller gets a single `Connection`
    /// error, never a partial result vector.
    ///
    /// # Errors
    /// Same taxonomy as [`Self::execute`].
    pub async fn execute_batch(
        &self,
        host: &str,
        commands: &[String],
    ) -> MonitorResult<Vec<String>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let mut combined = commands
            .iter()
            .enumerate()
            .map(|(i, c)| format!("echo '{BATCH_MARKER_PREFIX}{i}___'; {c}"))
            .collect::<Vec<_>>()
            .join("; ");
        combined.push_str(&format!("; echo '{BATCH_END_MARKER}'"));

        let output = self.run_on_session(host, &combined).await?;
        split_batch_output(&output, commands.len())
    }

    /// Closes every session. In-flight commands get the configured grace
    /// period to finish; afterwards their transports are abandoned and
    /// torn down on drop. New calls fail with `ShuttingDown` immediately.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let slots: Vec<(String, Arc<Mutex<Session>>)> = {
            let mut sessions = self.sessions.write().expect("session map poisoned");
            sessions.drain().collect()
        };
        for (host, slot) in slots {
            match tokio::time::timeout(self.config.shutdown_grace, slot.lock()).await {
                Ok(mut session) => {
                    if let Some(mut t) = session.take_transport(SessionState::Closed) {
                        t.close().await;
                    }
                }
                Err(_) => {
                    tracing::warn!(host = %host, "grace period elapsed; abandoning transport");
                }
            }
        }
        tracing::info!("connection pool shut down");
    }

    fn slot(&self, host: &str) -> MonitorResult<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().expect("session map poisoned");
        sessions
            .get(host)
            .cloned()
            .ok_or_else(|| MonitorError::HostNotFound(host.to_string()))
    }

    async fn run_on_session(&self, host: &str, command: &str) -> MonitorResult<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MonitorError::ShuttingDown);
        }
        let slot = self.slot(host)?;
        // One command stream per host: this lock is the serialization point
        let mut session = slot.lock().await;
        self.ensure_ready(&mut session).await?;

        let transport = session
            .transport_mut()
            .ok_or_else(|| MonitorError::Connection("session has no transport".into()))?;

        match transport.run(command).await {
            Ok(output) => {
                session.mark_success();
                Ok(output)
            }
            Err(MonitorError::Auth(msg)) => {
                tracing::warn!(host, error = %msg, "session authentication rejected");
                session.mark_auth_failed(msg.clone());
                Err(MonitorError::Auth(msg))
            }
            Err(MonitorError::Connection(msg)) => {
                tracing::debug!(host, error = %msg, "command failed, session degraded");
                session.mark_degraded(Instant::now(), msg.clone());
                Err(MonitorError::Connection(msg))
            }
            Err(other) => Err(other),
        }
    }

    /// Brings a session to `Ready`, reconnecting within the per-call
    /// attempt budget. The shared backoff deadline gates every caller:
    /// arriving before it elapses fails without any network activity.
    async fn ensure_ready(&self, session: &mut Session) -> MonitorResult<()> {
        if session.is_ready() {
            return Ok(());
        }
        if session.state() == SessionState::AuthFailed {
            return Err(MonitorError::Auth(
                session
                    .backoff()
                    .last_error()
                    .unwrap_or("authentication previously rejected")
                    .to_string(),
            ));
        }

        let now = Instant::now();
        if session.backoff().is_gated(now) {
            return Err(MonitorError::Connection(format!(
                "backoff gate closed for {}ms after {} consecutive failures: {}",
                session.backoff().remaining(now).as_millis(),
                session.backoff().consecutive_failures(),
                session.backoff().last_error().unwrap_or("unknown error"),
            )));
        }

        let attempts = session.backoff().config().attempts_per_call.max(1);
        let host = session.identity().id.clone();

        for attempt in 1..=attempts {
            session.mark_connecting();
            match self.transport.connect(session.identity()).await {
                Ok(t) => {
                    tracing::info!(host = %host, attempt, "session ready");
                    session.mark_ready(t);
                    return Ok(());
                }
                Err(MonitorError::Auth(msg)) => {
                    tracing::warn!(host = %host, error = %msg, "authentication failed");
                    session.mark_auth_failed(msg.clone());
                    return Err(MonitorError::Auth(msg));
                }
                Err(e) => {
                    let delay = session.mark_degraded(Instant::now(), e.to_string());
                    tracing::debug!(
                        host = %host,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "connect attempt failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(MonitorError::Connection(format!(
            "failed to connect to '{host}' after {attempts} attempts: {}",
            session.backoff().last_error().unwrap_or("unknown error"),
        )))
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("hosts", &self.host_ids())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Splits combined batch output back into per-command sections.
///
/// Every command marker and the end marker must be present; anything else
/// means the stream was cut and the whole batch is reported as a
/// connection failure rather than a partial result.
fn split_batch_output(output: &str, expected: usize) -> MonitorResult<Vec<String>> {
    let mut results: Vec<String> = Vec::with_capacity(expected);
    let mut current: Option<Vec<&str>> = None;
    let mut saw_end = false;

    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line == BATCH_END_MARKER {
            if let Some(section) = current.take() {
                results.push(section.join("\n"));
            }
            saw_end = true;
            break;
        }
        if let Some(rest) = line.strip_prefix(BATCH_MARKER_PREFIX) {
            if let Some(idx) = rest.strip_suffix("___").and_then(|n| n.parse::<usize>().ok()) {
                if let Some(section) = current.take() {
                    results.push(section.join("\n"));
                }
                if idx != results.len() {
                    return Err(MonitorError::Connection(format!(
                        "batch marker out of order (saw {idx}, expected {})",
                        results.len()
                    )));
                }
                current = Some(Vec::new());
                continue;
            }
        }
        if let Some(section) = current.as_mut() {
            section.push(line);
        }
    }

    if !saw_end || results.len() != expected {
        return Err(MonitorError::Connection(format!(
            "session dropped mid-batch ({} of {expected} commands completed)",
            results.len()
        )));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_batch_output_in_order() {
        let output = "\
___FLEETMON_CMD_0___
line a1
line a2
___FLEETMON_CMD_1___
line b
___FLEETMON_BATCH_END___
";
        let parts = split_batch_output(output, 2).unwrap();
        assert_eq!(parts, vec!["line a1\nline a2".to_string(), "line b".into()]);
    }

    #[test]
    fn test_split_batch_empty_sections_preserved() {
        let output = "\
___FLEETMON_CMD_0___
___FLEETMON_CMD_1___
out
___FLEETMON_BATCH_END___
";
        let parts = split_batch_output(output, 2).unwrap();
        assert_eq!(parts[0], "");
        assert_eq!(parts[1], "out");
    }

    #[test]
    fn test_split_batch_missing_end_marker_fails_whole_batch() {
        // Stream cut after the first command's output
        let output = "\
___FLEETMON_CMD_0___
out a
";
        let err = split_batch_output(output, 2).unwrap_err();
        assert!(matches!(err, MonitorError::Connection(_)));
    }

    #[test]
    fn test_split_batch_truncated_second_command_fails() {
        let output = "\
___FLEETMON_CMD_0___
out a
___FLEETMON_CMD_1___
partial
";
        // No end marker: even though both markers arrived, the stream
        // may have been cut inside command 1's output
        let err = split_batch_output(output, 2).unwrap_err();
        assert!(matches!(err, MonitorError::Connection(_)));
    }

    #[test]
    fn test_split_batch_trailing_noise_ignored_after_end() {
        let output = "\
___FLEETMON_CMD_0___
out
___FLEETMON_BATCH_END___
Connection to 10.0.0.1 closed.
";
        let parts = split_batch_output(output, 1).unwrap();
        assert_eq!(parts, vec!["out".to_string()]);
    }
}
