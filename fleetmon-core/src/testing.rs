//! Scripted transport doubles for tests
//!
//! [`MockTransport`] answers commands through a caller-supplied handler
//! and can be told to fail a number of connects first, or to reject
//! authentication outright. No network involved anywhere.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{MonitorError, MonitorResult};
use crate::host::HostIdentity;
use crate::pool::transport::{Transport, TransportSession};

type Handler = dyn Fn(&str) -> MonitorResult<String> + Send + Sync;

/// In-memory [`Transport`] driven by a command handler
pub struct MockTransport {
    handler: Arc<Handler>,
    remaining_connect_failures: AtomicUsize,
    reject_auth: AtomicBool,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Creates a transport whose sessions answer every command through
    /// `handler`
    pub fn new(handler: impl Fn(&str) -> MonitorResult<String> + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            remaining_connect_failures: AtomicUsize::new(0),
            reject_auth: AtomicBool::new(false),
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Transport whose sessions return empty output for everything
    #[must_use]
    pub fn silent() -> Self {
        Self::new(|_| Ok(String::new()))
    }

    /// Fails the next `count` connect attempts with a connection error
    #[must_use]
    pub fn failing_connects(self, count: usize) -> Self {
        self.fail_next_connects(count);
        self
    }

    /// Arms connect failures on an already-shared transport, so a test
    /// can break an established session mid-scenario
    pub fn fail_next_connects(&self, count: usize) {
        self.remaining_connect_failures
            .store(count, Ordering::SeqCst);
    }

    /// Rejects every connect with an authentication error
    #[must_use]
    pub fn rejecting_auth(self) -> Self {
        self.reject_auth.store(true, Ordering::SeqCst);
        self
    }

    /// Number of connect attempts observed so far
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of session closes observed so far
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, host: &HostIdentity) -> MonitorResult<Box<dyn TransportSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(MonitorError::Auth(format!(
                "permission denied for {}",
                host.destination()
            )));
        }
        let remaining = self.remaining_connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_connect_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(MonitorError::Connection(format!(
                "connection refused by {}",
                host.address
            )));
        }
        Ok(Box::new(MockSession {
            handler: Arc::clone(&self.handler),
            closes: Arc::clone(&self.closes),
        }))
    }
}

/// Session produced by [`MockTransport`]
pub struct MockSession {
    handler: Arc<Handler>,
    closes: Arc<AtomicUsize>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self {
            handler: Arc::new(|_| Ok(String::new())),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl TransportSession for MockSession {
    async fn run(&mut self, command: &str) -> MonitorResult<String> {
        (self.handler)(command)
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds the combined output a host would produce for a marker-framed
/// batch, one entry per command, terminated by the end marker
#[must_use]
pub fn batch_reply(outputs: &[&str]) -> String {
    let mut combined = String::new();
    for (i, output) in outputs.iter().enumerate() {
        combined.push_str(&format!("___FLEETMON_CMD_{i}___\n"));
        if !output.is_empty() {
            combined.push_str(output);
            if !output.ends_with('\n') {
                combined.push('\n');
            }
        }
    }
    combined.push_str("___FLEETMON_BATCH_END___\n");
    combined
}

/// Like [`batch_reply`] but cut off after `keep` commands, simulating a
/// session dropped mid-batch (no end marker)
#[must_use]
pub fn truncated_batch_reply(outputs: &[&str], keep: usize) -> String {
    let mut combined = String::new();
    for (i, output) in outputs.iter().enumerate().take(keep) {
        combined.push_str(&format!("___FLEETMON_CMD_{i}___\n"));
        combined.push_str(output);
        if !output.ends_with('\n') {
            combined.push('\n');
        }
    }
    combined
}
