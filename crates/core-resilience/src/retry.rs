//! Retry policy with exponential backoff and full jitter
//!
//! Attempt `k` (1-indexed) that fails is followed by a sleep of
//! `min(max_delay, initial_delay * backoff_base^(k-1))`, or a uniformly random
//! duration in `[0, that]` when jitter is enabled. Nothing sleeps after the
//! final attempt, and the last failure is returned unchanged.
//!
//! # Example
//!
//! ```no_run
//! use rampart_core_resilience::retry::{RetryConfig, RetryPolicy, RetryPreset};
//! use rampart_core_resilience::ResilienceError;
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let policy = RetryPolicy::new(RetryConfig::preset(RetryPreset::Http));
//!
//! let body = policy
//!     .execute(|| async {
//!         // Your flaky call here
//!         Ok::<_, ResilienceError>("ok")
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use super::error::{ConfigError, FailureKind, KindFilter, ResilienceError, Result};
use super::retry_budget::RetryBudget;
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked before each retry sleep with the failed attempt number
pub type RetryHook = Arc<dyn Fn(u32, &ResilienceError) + Send + Sync>;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_base: f64,
    /// Draw the actual delay uniformly from `[0, computed]`
    pub use_jitter: bool,
    /// Kinds that may be retried
    pub retryable_kinds: KindFilter,
    /// Kinds that are never retried, even if otherwise retryable
    pub excluded_kinds: HashSet<FailureKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_base: 2.0,
            use_jitter: true,
            retryable_kinds: KindFilter::Any,
            excluded_kinds: HashSet::from([FailureKind::CIRCUIT_OPEN]),
        }
    }
}

impl RetryConfig {
    /// Build the configuration of a named preset
    pub fn preset(preset: RetryPreset) -> Self {
        match preset {
            RetryPreset::Default => Self::default(),
            RetryPreset::Aggressive => Self {
                max_attempts: 5,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(120),
                ..Default::default()
            },
            RetryPreset::Conservative => Self {
                max_attempts: 2,
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
                ..Default::default()
            },
            RetryPreset::Database => Self {
                max_attempts: 3,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(5),
                retryable_kinds: KindFilter::only([FailureKind::CONNECTION, FailureKind::TIMEOUT]),
                ..Default::default()
            },
            RetryPreset::Http => Self {
                max_attempts: 3,
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(10),
                use_jitter: true,
                ..Default::default()
            },
            RetryPreset::Idempotent => Self {
                max_attempts: 5,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                ..Default::default()
            },
        }
    }

    /// Look up a preset by name
    pub fn named(name: &str) -> std::result::Result<Self, ConfigError> {
        name.parse::<RetryPreset>().map(Self::preset)
    }

    /// Check the configuration invariants
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::InvalidRetry(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.initial_delay.is_zero() {
            return Err(ConfigError::InvalidRetry(
                "initial_delay must be positive".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::InvalidRetry(format!(
                "max_delay ({:?}) must not be shorter than initial_delay ({:?})",
                self.max_delay, self.initial_delay
            )));
        }
        if !self.backoff_base.is_finite() || self.backoff_base < 1.0 {
            return Err(ConfigError::InvalidRetry(format!(
                "backoff_base must be at least 1.0, got {}",
                self.backoff_base
            )));
        }
        Ok(())
    }

    /// Whether a failure of this kind triggers another attempt
    pub fn should_retry(&self, error: &ResilienceError) -> bool {
        let kind = error.kind();
        self.retryable_kinds.matches(&kind) && !self.excluded_kinds.contains(&kind)
    }

    /// Delay after failed attempt `attempt` (1-indexed), before jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_base.powi(exponent);

        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// Actual sleep after failed attempt `attempt`, with full jitter if enabled
    pub fn sleep_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        if !self.use_jitter || delay.is_zero() {
            return delay;
        }

        let upper = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rand::rng().random_range(0..=upper))
    }
}

/// Built-in retry presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryPreset {
    /// 3 attempts, 1s initial, 60s cap
    Default,
    /// 5 attempts, 0.5s initial, 120s cap
    Aggressive,
    /// 2 attempts, 2s initial, 30s cap
    Conservative,
    /// 3 attempts, 0.1s initial, 5s cap, connection and timeout failures only
    Database,
    /// 3 attempts, 1s initial, 10s cap
    Http,
    /// 5 attempts, 0.5s initial, 30s cap
    Idempotent,
}

impl RetryPreset {
    /// Every built-in preset
    pub const ALL: [RetryPreset; 6] = [
        RetryPreset::Default,
        RetryPreset::Aggressive,
        RetryPreset::Conservative,
        RetryPreset::Database,
        RetryPreset::Http,
        RetryPreset::Idempotent,
    ];

    /// Preset name as used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            RetryPreset::Default => "default",
            RetryPreset::Aggressive => "aggressive",
            RetryPreset::Conservative => "conservative",
            RetryPreset::Database => "database",
            RetryPreset::Http => "http",
            RetryPreset::Idempotent => "idempotent",
        }
    }
}

impl fmt::Display for RetryPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RetryPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RetryPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| ConfigError::UnknownPreset {
                family: "retry",
                name: s.to_string(),
            })
    }
}

/// Retries a failing operation according to a [`RetryConfig`]
///
/// Cloning is cheap. A policy may carry a shared [`RetryBudget`]; the budget
/// sees one request per `execute` call and one retry per extra attempt.
#[derive(Clone)]
pub struct RetryPolicy {
    config: Arc<RetryConfig>,
    budget: Option<RetryBudget>,
    on_retry: Option<RetryHook>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("budget", &self.budget)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Create a policy from a configuration
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: Arc::new(config),
            budget: None,
            on_retry: None,
        }
    }

    /// Create a policy from a built-in preset
    pub fn from_preset(preset: RetryPreset) -> Self {
        Self::new(RetryConfig::preset(preset))
    }

    /// Attach a shared retry budget
    pub fn with_budget(mut self, budget: RetryBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Register a callback run before each retry sleep
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(u32, &ResilienceError) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Policy configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Attached budget, if any
    pub fn budget(&self) -> Option<&RetryBudget> {
        self.budget.as_ref()
    }

    /// Execute an operation, retrying retryable failures with backoff
    pub async fn execute<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(budget) = &self.budget {
            budget.record_request();
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !self.config.should_retry(&error) {
                tracing::debug!(kind = %error.kind(), "Failure is not retryable");
                return Err(error);
            }

            if attempt >= max_attempts {
                tracing::debug!(
                    attempts = attempt,
                    error = %error,
                    "Retry attempts exhausted"
                );
                return Err(error);
            }

            if let Some(budget) = &self.budget {
                if !budget.can_retry() {
                    tracing::warn!(
                        attempt,
                        error = %error,
                        "Retry budget exhausted, giving up"
                    );
                    return Err(error);
                }
                budget.record_retry();
            }

            let delay = self.config.sleep_for(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after failure"
            );
            if let Some(hook) = &self.on_retry {
                hook(attempt, &error);
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Execute an operation under a retry configuration
pub async fn execute_with_retry<F, Fut, T>(op: F, config: &RetryConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryPolicy::new(config.clone()).execute(op).await
}

/// Re-run a successful operation while `predicate` holds for its result
///
/// Useful for polling. Waits a fixed `delay` between attempts and returns the
/// last value once `max_attempts` is reached. Failures propagate immediately.
pub async fn retry_on_result<F, Fut, T, P>(
    mut op: F,
    predicate: P,
    max_attempts: u32,
    delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let value = op().await?;
        if !predicate(&value) || attempt >= max_attempts {
            return Ok(value);
        }

        tracing::debug!(attempt, max_attempts, "Result requested another attempt");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry_budget::RetryBudgetConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn no_jitter(max_attempts: u32, initial: Duration, base: f64) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: initial,
            backoff_base: base,
            use_jitter: false,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_invokes_max_attempts() {
        let policy = RetryPolicy::new(no_jitter(4, Duration::from_millis(10), 2.0));
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(ResilienceError::transient(format!("attempt {}", n)))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            result.unwrap_err().to_string(),
            "transient failure: attempt 4"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_after_backoff() {
        let policy = RetryPolicy::new(no_jitter(3, Duration::from_secs(1), 2.0));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ResilienceError::transient("not yet"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_final_attempt() {
        let policy = RetryPolicy::new(no_jitter(2, Duration::from_secs(1), 2.0));
        let start = Instant::now();

        let _: Result<()> = policy
            .execute(|| async { Err(ResilienceError::transient("down")) })
            .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_kind_propagates_immediately() {
        let config = RetryConfig::preset(RetryPreset::Database);
        let policy = RetryPolicy::new(config);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::permanent("constraint violation"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), FailureKind::PERMANENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_open_not_retried_by_default() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::CircuitOpen {
                    name: "db".to_string(),
                    remaining: Duration::from_secs(3),
                })
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_circuit_open());
    }

    #[test]
    fn test_backoff_delay_exact() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..no_jitter(10, Duration::from_secs(1), 2.0)
        };
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(4), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(60), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(u32::MAX), Duration::from_secs(5));

        let config = no_jitter(5, Duration::from_millis(100), 1.5);
        assert_eq!(config.backoff_delay(2), Duration::from_millis(150));
        assert_eq!(config.sleep_for(3), Duration::from_millis(225));
    }

    #[test]
    fn test_full_jitter_bounds() {
        let config = RetryConfig {
            use_jitter: true,
            ..no_jitter(5, Duration::from_millis(200), 2.0)
        };
        for attempt in 1..=4 {
            let ceiling = config.backoff_delay(attempt);
            for _ in 0..200 {
                assert!(config.sleep_for(attempt) <= ceiling);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_refusal_returns_last_failure() {
        let budget = RetryBudget::new(RetryBudgetConfig {
            window: Duration::from_secs(10),
            max_retry_percent: 0.0,
            min_retries_per_second: 0.0,
        });
        let policy = RetryPolicy::new(no_jitter(5, Duration::from_millis(10), 2.0))
            .with_budget(budget.clone());
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::connection("refused"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), FailureKind::CONNECTION);
        let stats = budget.stats();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_records_requests_and_retries() {
        let budget = RetryBudget::default();
        let policy = RetryPolicy::new(no_jitter(3, Duration::from_millis(10), 2.0))
            .with_budget(budget.clone());

        let _: Result<()> = policy
            .execute(|| async { Err(ResilienceError::transient("flaky")) })
            .await;

        let stats = budget.stats();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let policy = RetryPolicy::new(no_jitter(3, Duration::from_millis(10), 2.0)).on_retry(
            move |attempt, error| {
                recorder
                    .lock()
                    .unwrap()
                    .push((attempt, error.kind().to_string()));
            },
        );

        let _: Result<()> = policy
            .execute(|| async { Err(ResilienceError::connection("reset")) })
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (1, "connection".to_string()),
                (2, "connection".to_string())
            ]
        );
    }

    #[test]
    fn test_validation() {
        assert!(RetryConfig::default().validate().is_ok());

        let config = RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry(_))));

        let config = RetryConfig {
            initial_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry(_))));

        let config = RetryConfig {
            backoff_base: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets() {
        for preset in RetryPreset::ALL {
            let config = RetryConfig::preset(preset);
            assert!(config.validate().is_ok(), "{} preset is invalid", preset);
            assert_eq!(preset.name().parse::<RetryPreset>().unwrap(), preset);
        }

        let aggressive = RetryConfig::named("aggressive").unwrap();
        assert_eq!(aggressive.max_attempts, 5);
        assert_eq!(aggressive.initial_delay, Duration::from_millis(500));
        assert_eq!(aggressive.max_delay, Duration::from_secs(120));

        let database = RetryConfig::named("database").unwrap();
        assert!(database.should_retry(&ResilienceError::connection("refused")));
        assert!(database.should_retry(&ResilienceError::Timeout {
            label: "query".to_string(),
            duration: Duration::from_secs(1),
        }));
        assert!(!database.should_retry(&ResilienceError::transient("other")));

        assert_eq!(
            RetryConfig::named("reckless"),
            Err(ConfigError::UnknownPreset {
                family: "retry",
                name: "reckless".to_string(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry() {
        let calls = AtomicU32::new(0);
        let config = no_jitter(2, Duration::from_millis(5), 2.0);

        let result = execute_with_retry(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ResilienceError::transient("first"))
                } else {
                    Ok("second")
                }
            },
            &config,
        )
        .await;

        assert_eq!(result.unwrap(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_result() {
        let calls = AtomicU32::new(0);

        let value = retry_on_result(
            || async { Ok::<_, ResilienceError>(calls.fetch_add(1, Ordering::SeqCst)) },
            |n| *n < 2,
            5,
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(value, 2);

        let exhausted = retry_on_result(
            || async { Ok::<_, ResilienceError>(None::<u32>) },
            |v| v.is_none(),
            3,
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(exhausted, None);
    }
}
