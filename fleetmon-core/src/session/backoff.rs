//! Reconnect backoff policy
//!
//! After consecutive failures a session carries a single shared deadline;
//! every caller is gated by it, so a host that is down is not hammered by
//! each collector independently. The delay doubles per failure up to a cap
//! and resets to the base after one successful command.

use std::time::{Duration, Instant};

/// Default base delay before the first reconnect attempt
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default cap on the backoff delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default multiplier applied per consecutive failure
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default number of reconnect attempts inside one execute call
pub const DEFAULT_ATTEMPTS_PER_CALL: u32 = 3;

/// Backoff policy knobs
///
/// The delay after `n` consecutive failures is
/// `min(base_delay * multiplier^(n-1), max_delay)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BackoffConfig {
    /// Base delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Exponential growth factor
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Reconnect attempts allowed within a single execute call
    #[serde(default = "default_attempts_per_call")]
    pub attempts_per_call: u32,
}

const fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

const fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

const fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}

const fn default_attempts_per_call() -> u32 {
    DEFAULT_ATTEMPTS_PER_CALL
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            attempts_per_call: DEFAULT_ATTEMPTS_PER_CALL,
        }
    }
}

impl BackoffConfig {
    /// Creates a config with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base delay
    #[must_use]
    pub const fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Sets the delay cap
    #[must_use]
    pub const fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Sets the growth factor
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the per-call reconnect attempt budget
    #[must_use]
    pub const fn with_attempts_per_call(mut self, attempts: u32) -> Self {
        self.attempts_per_call = attempts;
        self
    }

    /// Delay after `consecutive_failures` failures (1-indexed).
    ///
    /// Zero failures means no delay.
    #[must_use]
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let exp = self
            .multiplier
            .powi(consecutive_failures.saturating_sub(1).min(63) as i32);
        let ms = (self.base_delay_ms as f64 * exp) as u64;
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Per-session backoff state shared by all callers
#[derive(Debug, Clone)]
pub struct BackoffState {
    config: BackoffConfig,
    consecutive_failures: u32,
    deadline: Option<Instant>,
    last_error: Option<String>,
}

impl BackoffState {
    /// Creates a clean state with the given policy
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            deadline: None,
            last_error: None,
        }
    }

    /// Number of consecutive failures recorded
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// The shared deadline gating all reconnect attempts, if any
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Most recent failure message
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns true while the deadline has not elapsed.
    ///
    /// Callers arriving during this window must fail fast without a
    /// network round trip.
    #[must_use]
    pub fn is_gated(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now < d)
    }

    /// Time remaining until the deadline elapses
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map_or(Duration::ZERO, |d| d.saturating_duration_since(now))
    }

    /// Records a failed connect or command and advances the deadline.
    ///
    /// Returns the delay applied, which strictly increases per failure
    /// until it reaches the configured cap.
    pub fn record_failure(&mut self, now: Instant, error: impl Into<String>) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());
        let delay = self.config.delay_after(self.consecutive_failures);
        self.deadline = Some(now + delay);
        delay
    }

    /// Clears failures and the deadline after one successful command
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.deadline = None;
        self.last_error = None;
    }

    /// The configured policy
    #[must_use]
    pub const fn config(&self) -> &BackoffConfig {
        &self.config
    }
}
