//! Session lifecycle for one monitored host
//!
//! A [`Session`] is the live command-execution channel to one host. It
//! owns the transport handle exclusively; collectors never see it. All
//! mutation happens under the pool's per-host lock.

mod backoff;

pub use backoff::{
    BackoffConfig, BackoffState, DEFAULT_ATTEMPTS_PER_CALL, DEFAULT_BASE_DELAY_MS,
    DEFAULT_MAX_DELAY_MS, DEFAULT_MULTIPLIER,
};

use std::time::Instant;

use crate::host::HostIdentity;
use crate::pool::transport::TransportSession;

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, no connection attempted yet
    Disconnected,
    /// A connect attempt is in progress
    Connecting,
    /// Connected and authenticated; commands may run
    Ready,
    /// Recent transport failures; reconnect gated by the backoff deadline
    Degraded,
    /// Authentication rejected; terminal until reconfigured
    AuthFailed,
    /// Transport closed deliberately; the epoch was bumped so the next
    /// use re-identifies the platform
    Closed,
}

impl SessionState {
    /// Human-readable state name for logs and snapshots
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::AuthFailed => "auth_failed",
            Self::Closed => "closed",
        }
    }
}

/// One logical connection to one host
pub struct Session {
    identity: HostIdentity,
    state: SessionState,
    transport: Option<Box<dyn TransportSession>>,
    backoff: BackoffState,
    epoch: u64,
}

impl Session {
    /// Creates a disconnected session; no network activity
    #[must_use]
    pub const fn new(identity: HostIdentity, backoff: BackoffConfig) -> Self {
        Self {
            identity,
            state: SessionState::Disconnected,
            transport: None,
            backoff: BackoffState::new(backoff),
            epoch: 0,
        }
    }

    /// The host this session belongs to
    #[must_use]
    pub const fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Backoff state shared by all callers of this session
    #[must_use]
    pub const fn backoff(&self) -> &BackoffState {
        &self.backoff
    }

    /// Detection epoch.
    ///
    /// Incremented each time the transport is deliberately closed
    /// ([`SessionState::Closed`]), signalling the platform resolver that
    /// the remote identity is untrusted from that point on.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a command can run without a reconnect
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready) && self.transport.is_some()
    }

    /// Marks the start of a connect attempt
    pub fn mark_connecting(&mut self) {
        self.state = SessionState::Connecting;
    }

    /// Installs a freshly connected transport
    pub fn mark_ready(&mut self, transport: Box<dyn TransportSession>) {
        self.transport = Some(transport);
        self.state = SessionState::Ready;
    }

    /// Records a transport failure, drops the handle, and advances the
    /// shared backoff deadline. Returns the delay applied.
    pub fn mark_degraded(
        &mut self,
        now: Instant,
        error: impl Into<String>,
    ) -> std::time::Duration {
        self.transport = None;
        self.state = SessionState::Degraded;
        self.backoff.record_failure(now, error)
    }

    /// Records an authentication rejection; the session fails fast from
    /// here on without reconnect attempts
    pub fn mark_auth_failed(&mut self, error: impl Into<String>) {
        self.transport = None;
        self.state = SessionState::AuthFailed;
        self.backoff.record_failure(Instant::now(), error);
    }

    /// Records a successful command, resetting the backoff to its base
    pub fn mark_success(&mut self) {
        self.backoff.record_success();
    }

    /// Mutable access to the transport, if connected
    pub fn transport_mut(&mut self) -> Option<&mut Box<dyn TransportSession>> {
        self.transport.as_mut()
    }

    /// Takes the transport for teardown, leaving the session in `state`.
    ///
    /// Closing bumps the epoch immediately. The bump must not depend on
    /// the next reconnect succeeding: a failed attempt in between would
    /// otherwise lose it, and the resolver would keep trusting a stale
    /// platform profile.
    pub fn take_transport(&mut self, state: SessionState) -> Option<Box<dyn TransportSession>> {
        if matches!(state, SessionState::Closed) {
            self.epoch += 1;
        }
        self.state = state;
        self.transport.take()
    }

    /// Whether the session was deliberately closed
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.identity.id)
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("failures", &self.backoff.consecutive_failures())
            .finish_non_exhaustive()
    }
}
