//! Circuit Breaker implementation for fault tolerance
//!
//! The circuit breaker prevents cascading failures by failing fast when a service
//! is experiencing issues. It has three states:
//! - Closed: Normal operation, requests pass through
//! - Open: Service is unhealthy, requests fail immediately
//! - HalfOpen: The cool-down has elapsed and a single trial call decides
//!   whether the circuit closes again or reopens
//!
//! Only one trial is ever in flight. Admission (cool-down check and marking
//! the trial) happens under the breaker's lock, so concurrent callers racing
//! for the trial slot see exactly one winner; the others are rejected with a
//! zero remaining cool-down.

use super::error::{ConfigError, FailureKind, ResilienceError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// State of the circuit breaker as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    Open,
    /// Cool-down elapsed, next call (or the one in flight) is the trial
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Duration the circuit stays open before a trial call is admitted
    pub reset_timeout: Duration,
    /// Failure kinds that propagate but never count against the breaker
    pub excluded_kinds: HashSet<FailureKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            excluded_kinds: HashSet::new(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration with the given threshold and reset timeout
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            excluded_kinds: HashSet::new(),
        }
    }

    /// Exclude a failure kind from the failure count
    pub fn exclude(mut self, kind: impl Into<FailureKind>) -> Self {
        self.excluded_kinds.insert(kind.into());
        self
    }

    /// Check the configuration invariants
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidBreaker(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn is_excluded(&self, kind: &FailureKind) -> bool {
        self.excluded_kinds.contains(kind)
    }
}

/// Read-only view of a breaker for health reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    /// Breaker name
    pub name: String,
    /// Effective state
    pub state: CircuitState,
    /// Consecutive failures recorded
    pub failure_count: u32,
    /// Failures needed to open the circuit
    pub failure_threshold: u32,
    /// Seconds left before a trial call is admitted (0 unless open)
    pub remaining_cooldown_secs: f64,
}

/// Where the breaker currently stands
#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { opened_at: Instant },
    /// A trial call is in flight; `opened_at` is kept so a released trial
    /// falls back to an open circuit whose cool-down has already elapsed
    Trial { opened_at: Instant },
}

/// Internal state of the circuit breaker
#[derive(Debug)]
struct CircuitBreakerState {
    phase: Phase,
    /// Consecutive failure count
    consecutive_failures: u32,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            phase: Phase::Closed,
            consecutive_failures: 0,
        }
    }
}

/// Circuit breaker for protecting against cascading failures
///
/// Cloning a breaker is cheap and the clones share one state machine.
///
/// # Example
/// ```no_run
/// use rampart_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), ResilienceError> {
///     let config = CircuitBreakerConfig::new(3, Duration::from_secs(30));
///     let breaker = CircuitBreaker::new("inventory-db", config);
///
///     let rows = breaker
///         .execute(|| async {
///             // Your operation here
///             Ok::<_, ResilienceError>(42)
///         })
///         .await?;
///
///     println!("Result: {}", rows);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    /// Create a new circuit breaker with default configuration
    pub fn new_default(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Breaker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the effective state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        let state = self.lock();
        self.effective_state(&state, Instant::now())
    }

    /// Get current failure count
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Check if the circuit is open and still cooling down
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Check if the circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Cool-down left before the next trial call (zero unless open)
    pub fn remaining_cooldown(&self) -> Duration {
        let state = self.lock();
        match state.phase {
            Phase::Open { opened_at } => self.remaining(opened_at, Instant::now()),
            _ => Duration::ZERO,
        }
    }

    /// Read-only snapshot for health reporting
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        let now = Instant::now();
        let remaining = match state.phase {
            Phase::Open { opened_at } => self.remaining(opened_at, now),
            _ => Duration::ZERO,
        };

        BreakerSnapshot {
            name: self.name.to_string(),
            state: self.effective_state(&state, now),
            failure_count: state.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            remaining_cooldown_secs: remaining.as_secs_f64(),
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.lock();
        state.phase = Phase::Closed;
        state.consecutive_failures = 0;
        tracing::info!(breaker = %self.name, "Circuit breaker manually reset");
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Fails with [`ResilienceError::CircuitOpen`] without invoking `op` while
    /// the circuit is open. Otherwise the operation's outcome is recorded and
    /// returned unchanged; failures of an excluded kind propagate without
    /// being recorded.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.admit()?;

        let result = op().await;
        match &result {
            Ok(_) => permit.succeed(),
            Err(e) => permit.fail(e),
        }
        result
    }

    /// Decide whether a call may proceed, claiming the trial slot if needed
    fn admit(&self) -> Result<CallPermit<'_>> {
        let mut state = self.lock();
        let now = Instant::now();

        match state.phase {
            Phase::Closed => Ok(CallPermit::new(self, false)),
            Phase::Open { opened_at } => {
                if now.saturating_duration_since(opened_at) >= self.config.reset_timeout {
                    state.phase = Phase::Trial { opened_at };
                    self.log_transition(CircuitState::Open, CircuitState::HalfOpen);
                    Ok(CallPermit::new(self, true))
                } else {
                    Err(self.rejection(self.remaining(opened_at, now)))
                }
            }
            Phase::Trial { .. } => Err(self.rejection(Duration::ZERO)),
        }
    }

    fn on_success(&self, trial: bool) {
        let mut state = self.lock();

        match (state.phase, trial) {
            (Phase::Trial { .. }, true) => {
                state.phase = Phase::Closed;
                state.consecutive_failures = 0;
                self.log_transition(CircuitState::HalfOpen, CircuitState::Closed);
            }
            (Phase::Closed, false) => {
                state.consecutive_failures = 0;
            }
            // Late outcome of a call admitted before the circuit opened
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool, error: &ResilienceError) {
        let kind = error.kind();
        if self.config.is_excluded(&kind) {
            tracing::debug!(
                breaker = %self.name,
                kind = %kind,
                "Excluded failure not recorded"
            );
            if trial {
                self.release_trial();
            }
            return;
        }

        let mut state = self.lock();
        let now = Instant::now();

        match (state.phase, trial) {
            (Phase::Trial { .. }, true) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.phase = Phase::Open { opened_at: now };
                self.log_transition(CircuitState::HalfOpen, CircuitState::Open);
            }
            (Phase::Closed, false) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                tracing::debug!(
                    breaker = %self.name,
                    failures = state.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    error = %error,
                    "Circuit breaker recorded failure"
                );

                if state.consecutive_failures >= self.config.failure_threshold {
                    state.phase = Phase::Open { opened_at: now };
                    self.log_transition(CircuitState::Closed, CircuitState::Open);
                }
            }
            _ => {}
        }
    }

    /// Give the trial slot back without deciding the next state
    fn release_trial(&self) {
        let mut state = self.lock();
        if let Phase::Trial { opened_at } = state.phase {
            state.phase = Phase::Open { opened_at };
            tracing::debug!(breaker = %self.name, "Trial call released without outcome");
        }
    }

    fn effective_state(&self, state: &CircuitBreakerState, now: Instant) -> CircuitState {
        match state.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { opened_at } => {
                if now.saturating_duration_since(opened_at) >= self.config.reset_timeout {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            Phase::Trial { .. } => CircuitState::HalfOpen,
        }
    }

    fn remaining(&self, opened_at: Instant, now: Instant) -> Duration {
        self.config
            .reset_timeout
            .saturating_sub(now.saturating_duration_since(opened_at))
    }

    fn rejection(&self, remaining: Duration) -> ResilienceError {
        ResilienceError::CircuitOpen {
            name: self.name.to_string(),
            remaining,
        }
    }

    fn log_transition(&self, from: CircuitState, to: CircuitState) {
        tracing::warn!(
            breaker = %self.name,
            from = from.as_str(),
            to = to.as_str(),
            "Circuit breaker state changed"
        );
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission ticket for one call
///
/// A trial permit that is dropped without an outcome (the call was
/// cancelled) releases the trial slot so the next caller can probe.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    fn fail(mut self, error: &ResilienceError) {
        self.settled = true;
        self.breaker.on_failure(self.trial, error);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial();
        }
    }
}
