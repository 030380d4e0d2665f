//! Error types for the resilience core
//!
//! Guards never look inside an operation's error. They only see the
//! [`FailureKind`] the caller attached to it, and dispatch on kind membership
//! in include/exclude sets.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = ResilienceError> = std::result::Result<T, E>;

/// Caller-declared classification of a failure
///
/// Kinds are plain labels. The crate defines a handful of well-known kinds;
/// callers are free to invent their own (`"rate_limited"`, `"not_found"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FailureKind(Cow<'static, str>);

impl FailureKind {
    /// Raised by a circuit breaker that rejects a call
    pub const CIRCUIT_OPEN: FailureKind = FailureKind::from_static("circuit_open");
    /// Raised by a timeout guard
    pub const TIMEOUT: FailureKind = FailureKind::from_static("timeout");
    /// Connection-level failure reported by the operation
    pub const CONNECTION: FailureKind = FailureKind::from_static("connection");
    /// Generic failure that may succeed on a later attempt
    pub const TRANSIENT: FailureKind = FailureKind::from_static("transient");
    /// Generic failure that will not succeed on a later attempt
    pub const PERMANENT: FailureKind = FailureKind::from_static("permanent");

    /// Create a kind from a static label
    pub const fn from_static(label: &'static str) -> Self {
        Self(Cow::Borrowed(label))
    }

    /// Create a kind from any label
    pub fn new(label: impl Into<String>) -> Self {
        Self(Cow::Owned(label.into()))
    }

    /// The label of this kind
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FailureKind {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for FailureKind {
    fn from(label: String) -> Self {
        Self(Cow::Owned(label))
    }
}

/// Selects which failure kinds a rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KindFilter {
    /// Every kind matches
    #[default]
    Any,
    /// Only the listed kinds match
    Only(HashSet<FailureKind>),
}

impl KindFilter {
    /// Build a filter that matches only the given kinds
    pub fn only<I, K>(kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<FailureKind>,
    {
        KindFilter::Only(kinds.into_iter().map(Into::into).collect())
    }

    /// Check whether `kind` is selected by this filter
    pub fn matches(&self, kind: &FailureKind) -> bool {
        match self {
            KindFilter::Any => true,
            KindFilter::Only(kinds) => kinds.contains(kind),
        }
    }
}

/// Errors surfaced by a protected call
///
/// A protected call either succeeds, fails with the operation's own failure
/// (`Operation`), or fails with one of the two synthetic kinds produced by the
/// guards themselves (`CircuitOpen`, `Timeout`).
#[derive(Debug, Error, Clone)]
pub enum ResilienceError {
    /// Circuit breaker is open, rejecting requests
    #[error("Circuit breaker '{name}' is open, retry after {:.1}s", .remaining.as_secs_f64())]
    CircuitOpen {
        /// Name of the rejecting breaker
        name: String,
        /// Cool-down left before a trial call is admitted
        remaining: Duration,
    },

    /// Operation exceeded its deadline
    #[error("Operation '{label}' timed out after {duration:?}")]
    Timeout {
        /// Label of the guarded operation
        label: String,
        /// Timeout in effect when the call started
        duration: Duration,
    },

    /// Failure reported by the protected operation itself
    #[error("{kind} failure: {message}")]
    Operation {
        /// Caller-declared kind used for classification
        kind: FailureKind,
        /// Human readable description
        message: String,
        /// Underlying error, kept for root-cause inspection
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },
}

impl ResilienceError {
    /// Operation failure with a kind and message
    pub fn operation(kind: impl Into<FailureKind>, message: impl Into<String>) -> Self {
        ResilienceError::Operation {
            kind: kind.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Operation failure wrapping an underlying error
    pub fn with_source<E>(kind: impl Into<FailureKind>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ResilienceError::Operation {
            kind: kind.into(),
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    /// Shorthand for a [`FailureKind::TRANSIENT`] failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self::operation(FailureKind::TRANSIENT, message)
    }

    /// Shorthand for a [`FailureKind::PERMANENT`] failure
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::operation(FailureKind::PERMANENT, message)
    }

    /// Shorthand for a [`FailureKind::CONNECTION`] failure
    pub fn connection(message: impl Into<String>) -> Self {
        Self::operation(FailureKind::CONNECTION, message)
    }

    /// Kind used by the guards to classify this failure
    pub fn kind(&self) -> FailureKind {
        match self {
            ResilienceError::CircuitOpen { .. } => FailureKind::CIRCUIT_OPEN,
            ResilienceError::Timeout { .. } => FailureKind::TIMEOUT,
            ResilienceError::Operation { kind, .. } => kind.clone(),
        }
    }

    /// Check if this error was raised by an open circuit breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Check if this error was raised by a timeout guard
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// Remaining cool-down carried by a circuit-open rejection
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        match self {
            ResilienceError::CircuitOpen { remaining, .. } => Some(*remaining),
            _ => None,
        }
    }
}

/// Invalid configuration values or preset names
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Retry configuration violates an invariant
    #[error("Invalid retry configuration: {0}")]
    InvalidRetry(String),

    /// Timeout configuration violates an invariant
    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    /// Circuit breaker configuration violates an invariant
    #[error("Invalid circuit breaker configuration: {0}")]
    InvalidBreaker(String),

    /// Retry budget configuration violates an invariant
    #[error("Invalid retry budget configuration: {0}")]
    InvalidBudget(String),

    /// No preset with this name exists
    #[error("Unknown {family} preset '{name}'")]
    UnknownPreset {
        /// Preset family (`retry` or `timeout`)
        family: &'static str,
        /// Requested name
        name: String,
    },
}
