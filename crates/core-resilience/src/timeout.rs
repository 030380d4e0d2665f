//! Timeout guards: fixed deadlines and percentile-tuned adaptive deadlines
//!
//! Expiry drops the in-flight future, which cancels the attempt at its next
//! suspension point. Whatever the operation would have produced afterwards is
//! discarded and the caller receives [`ResilienceError::Timeout`].
//!
//! The adaptive variant keeps a capped window of recent successful latencies.
//! Once at least [`MIN_SAMPLES`] samples exist, every new sample recomputes the
//! deadline as `clamp(min, max, percentile(samples, p) * buffer)`. A timeout
//! immediately widens the deadline by 10% (capped at `max`) so consecutive
//! timeouts against a slow dependency do not repeat forever.

use super::error::{ConfigError, ResilienceError, Result};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Samples required before the adaptive timeout is recomputed
pub const MIN_SAMPLES: usize = 10;

/// Factor applied to the adaptive timeout after a timeout occurs
const TIMEOUT_BUMP: f64 = 1.1;

/// Named bundle of timeouts for one class of dependency
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutConfig {
    /// Deadline for a whole guarded call
    pub default_timeout: Duration,
    /// Deadline for establishing a connection
    pub connect_timeout: Duration,
    /// Deadline for reading a response
    pub read_timeout: Duration,
    /// Deadline for writing a request
    pub write_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    /// Build the configuration of a named preset
    pub fn preset(preset: TimeoutPreset) -> Self {
        let secs = Duration::from_secs;
        match preset {
            TimeoutPreset::Default => Self::default(),
            TimeoutPreset::Fast => Self {
                default_timeout: secs(5),
                connect_timeout: secs(2),
                read_timeout: secs(5),
                write_timeout: secs(5),
            },
            TimeoutPreset::Slow => Self {
                default_timeout: secs(120),
                connect_timeout: secs(10),
                read_timeout: secs(120),
                write_timeout: secs(60),
            },
            TimeoutPreset::Database => Self {
                default_timeout: secs(10),
                connect_timeout: secs(5),
                read_timeout: secs(10),
                write_timeout: secs(10),
            },
            TimeoutPreset::ExternalApi => Self {
                default_timeout: secs(30),
                connect_timeout: secs(5),
                read_timeout: secs(30),
                write_timeout: secs(10),
            },
        }
    }

    /// Look up a preset by name
    pub fn named(name: &str) -> std::result::Result<Self, ConfigError> {
        name.parse::<TimeoutPreset>().map(Self::preset)
    }

    /// Check the configuration invariants
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let fields = [
            ("default_timeout", self.default_timeout),
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
        ];
        for (field, value) in fields {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout(format!(
                    "{} must be positive",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Built-in timeout presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutPreset {
    /// 30s overall, 5s connect
    Default,
    /// 5s overall, 2s connect
    Fast,
    /// 120s overall, 10s connect
    Slow,
    /// 10s overall, 5s connect
    Database,
    /// 30s overall, 5s connect, 10s write
    ExternalApi,
}

impl TimeoutPreset {
    /// Every built-in preset
    pub const ALL: [TimeoutPreset; 5] = [
        TimeoutPreset::Default,
        TimeoutPreset::Fast,
        TimeoutPreset::Slow,
        TimeoutPreset::Database,
        TimeoutPreset::ExternalApi,
    ];

    /// Preset name as used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            TimeoutPreset::Default => "default",
            TimeoutPreset::Fast => "fast",
            TimeoutPreset::Slow => "slow",
            TimeoutPreset::Database => "database",
            TimeoutPreset::ExternalApi => "external_api",
        }
    }
}

impl fmt::Display for TimeoutPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TimeoutPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TimeoutPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| ConfigError::UnknownPreset {
                family: "timeout",
                name: s.to_string(),
            })
    }
}

/// Run an operation under a deadline
pub async fn execute_with_timeout<F, Fut, T>(op: F, duration: Duration, label: &str) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, op()).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                operation = label,
                timeout_ms = duration.as_millis() as u64,
                "Operation timed out"
            );
            Err(ResilienceError::Timeout {
                label: label.to_string(),
                duration,
            })
        }
    }
}

/// Fixed deadline for a labelled operation
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    label: Arc<str>,
    duration: Duration,
}

impl TimeoutGuard {
    /// Create a guard with an explicit deadline
    pub fn new(label: impl Into<String>, duration: Duration) -> Self {
        let label: String = label.into();
        Self {
            label: Arc::from(label),
            duration,
        }
    }

    /// Create a guard using the `default_timeout` of a configuration
    pub fn from_config(label: impl Into<String>, config: &TimeoutConfig) -> Self {
        Self::new(label, config.default_timeout)
    }

    /// Operation label reported in timeout errors
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Deadline applied to each call
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Execute an operation under this guard's deadline
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        execute_with_timeout(op, self.duration, &self.label).await
    }
}

/// Configuration for an adaptive timeout
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveTimeoutConfig {
    /// Deadline used until enough samples exist
    pub initial_timeout: Duration,
    /// Lower bound of the computed deadline
    pub min_timeout: Duration,
    /// Upper bound of the computed deadline
    pub max_timeout: Duration,
    /// Latency percentile tracked (0-100)
    pub target_percentile: f64,
    /// Safety factor applied to the percentile
    pub buffer_multiplier: f64,
    /// Number of recent samples kept
    pub sample_window_size: usize,
}

impl Default for AdaptiveTimeoutConfig {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_secs(30),
            min_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(120),
            target_percentile: 99.0,
            buffer_multiplier: 1.5,
            sample_window_size: 100,
        }
    }
}

impl AdaptiveTimeoutConfig {
    /// Check the configuration invariants
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.min_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "min_timeout must be positive".to_string(),
            ));
        }
        if self.min_timeout > self.max_timeout {
            return Err(ConfigError::InvalidTimeout(
                "min_timeout must not exceed max_timeout".to_string(),
            ));
        }
        if !(self.target_percentile > 0.0 && self.target_percentile <= 100.0) {
            return Err(ConfigError::InvalidTimeout(format!(
                "target_percentile must be within (0, 100], got {}",
                self.target_percentile
            )));
        }
        if !self.buffer_multiplier.is_finite() || self.buffer_multiplier <= 0.0 {
            return Err(ConfigError::InvalidTimeout(format!(
                "buffer_multiplier must be positive, got {}",
                self.buffer_multiplier
            )));
        }
        if self.sample_window_size == 0 {
            return Err(ConfigError::InvalidTimeout(
                "sample_window_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn clamp(&self, value: Duration) -> Duration {
        value.max(self.min_timeout).min(self.max_timeout)
    }
}

/// Latency at `percentile` of `samples`
///
/// Sorts a copy of the samples and indexes at `floor(len * percentile / 100)`,
/// clamped to the last element. Returns `None` for an empty slice.
pub fn percentile(samples: &[Duration], percentile: f64) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let index = (sorted.len() as f64 * percentile / 100.0).floor().max(0.0) as usize;
    sorted.get(index.min(sorted.len() - 1)).copied()
}

/// Deadline tuned from recently observed latencies
///
/// One instance is meant to be shared by every caller of a call site. The
/// active deadline is published through a single atomic so readers never see
/// a partially updated value.
#[derive(Debug)]
pub struct AdaptiveTimeout {
    config: AdaptiveTimeoutConfig,
    samples: Mutex<VecDeque<Duration>>,
    current_nanos: AtomicU64,
}

impl AdaptiveTimeout {
    /// Create an adaptive timeout; the initial deadline is clamped into range
    pub fn new(config: AdaptiveTimeoutConfig) -> Self {
        let initial = config.clamp(config.initial_timeout);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(config.sample_window_size)),
            current_nanos: AtomicU64::new(to_nanos(initial)),
            config,
        }
    }

    /// Configuration
    pub fn config(&self) -> &AdaptiveTimeoutConfig {
        &self.config
    }

    /// Deadline currently in effect
    pub fn current_timeout(&self) -> Duration {
        Duration::from_nanos(self.current_nanos.load(Ordering::Acquire))
    }

    /// Number of latency samples held
    pub fn sample_count(&self) -> usize {
        self.lock().len()
    }

    /// Record the latency of a successful call
    pub fn record_latency(&self, latency: Duration) {
        let mut samples = self.lock();
        samples.push_back(latency);
        while samples.len() > self.config.sample_window_size {
            samples.pop_front();
        }

        if samples.len() < MIN_SAMPLES {
            return;
        }

        let window: Vec<Duration> = samples.iter().copied().collect();
        let Some(observed) = percentile(&window, self.config.target_percentile) else {
            return;
        };

        let nanos = observed.as_nanos() as f64 * self.config.buffer_multiplier;
        let next = if !nanos.is_finite() || nanos >= self.config.max_timeout.as_nanos() as f64 {
            self.config.max_timeout
        } else {
            self.config.clamp(Duration::from_nanos(nanos.round() as u64))
        };

        // Stored while holding the sample lock so recomputations never interleave
        self.current_nanos.store(to_nanos(next), Ordering::Release);
        tracing::debug!(
            samples = window.len(),
            percentile_ms = observed.as_millis() as u64,
            timeout_ms = next.as_millis() as u64,
            "Adaptive timeout recomputed"
        );
    }

    /// Widen the deadline after a timeout occurred
    pub fn record_timeout(&self) {
        let max = to_nanos(self.config.max_timeout);
        let _ = self
            .current_nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let bumped = (current as f64 * TIMEOUT_BUMP).round();
                Some(if bumped >= max as f64 { max } else { bumped as u64 })
            });
    }

    /// Execute an operation under the current adaptive deadline
    ///
    /// Successful calls feed their latency back; a timeout widens the
    /// deadline. The error reports the deadline in effect when the call began.
    pub async fn execute<F, Fut, T>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = self.current_timeout();
        let start = Instant::now();

        match tokio::time::timeout(deadline, op()).await {
            Ok(result) => {
                if result.is_ok() {
                    self.record_latency(start.elapsed());
                }
                result
            }
            Err(_) => {
                self.record_timeout();
                tracing::error!(
                    operation = label,
                    timeout_ms = deadline.as_millis() as u64,
                    next_timeout_ms = self.current_timeout().as_millis() as u64,
                    "Operation timed out"
                );
                Err(ResilienceError::Timeout {
                    label: label.to_string(),
                    duration: deadline,
                })
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Duration>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AdaptiveTimeout {
    fn default() -> Self {
        Self::new(AdaptiveTimeoutConfig::default())
    }
}

fn to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
