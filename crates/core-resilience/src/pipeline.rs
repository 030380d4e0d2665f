//! Composition of breaker, retry and timeout around one operation
//!
//! The pipeline is sugar over explicit nesting. With the default
//! [`BreakerPlacement::Outer`] a call runs as
//!
//! ```text
//! breaker.execute(|| retry.execute(|| timeout.execute(op)))
//! ```
//!
//! so a whole retry sequence counts as one breaker outcome. With
//! [`BreakerPlacement::PerAttempt`] the breaker sits inside the retry loop
//!
//! ```text
//! retry.execute(|| breaker.execute(|| timeout.execute(op)))
//! ```
//!
//! and every attempt is recorded individually. Each guard is optional, and
//! each one stays usable on its own.

use super::circuit_breaker::CircuitBreaker;
use super::error::Result;
use super::retry::RetryPolicy;
use super::timeout::{execute_with_timeout, AdaptiveTimeout};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Where the circuit breaker sits relative to the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPlacement {
    /// The entire retry sequence is one breaker call
    #[default]
    Outer,
    /// Each attempt passes through the breaker
    PerAttempt,
}

/// Deadline applied to each attempt
#[derive(Debug, Clone)]
pub enum TimeoutStrategy {
    /// Same deadline for every attempt
    Fixed(Duration),
    /// Deadline tuned from observed latencies
    Adaptive(Arc<AdaptiveTimeout>),
}

/// Builder-style composition of the resilience guards
///
/// # Example
///
/// ```no_run
/// use rampart_core_resilience::prelude::*;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), ResilienceError> {
/// let breaker = Arc::new(CircuitBreaker::new_default("orders-api"));
/// let pipeline = ResiliencePipeline::new("list_orders")
///     .with_breaker(breaker)
///     .with_retry(RetryPolicy::from_preset(RetryPreset::Http))
///     .with_timeout(Duration::from_secs(5));
///
/// let orders = pipeline
///     .execute(|| async { Ok::<_, ResilienceError>(vec![1, 2, 3]) })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResiliencePipeline {
    label: Arc<str>,
    breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<RetryPolicy>,
    timeout: Option<TimeoutStrategy>,
    placement: BreakerPlacement,
}

impl ResiliencePipeline {
    /// Create a pipeline without guards; `label` names the operation in errors
    pub fn new(label: impl Into<String>) -> Self {
        let label: String = label.into();
        Self {
            label: Arc::from(label),
            breaker: None,
            retry: None,
            timeout: None,
            placement: BreakerPlacement::default(),
        }
    }

    /// Protect the operation with a circuit breaker
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Retry failed attempts with a policy
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Apply a fixed deadline to each attempt
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(TimeoutStrategy::Fixed(duration));
        self
    }

    /// Apply an adaptive deadline to each attempt
    pub fn with_adaptive_timeout(mut self, timeout: Arc<AdaptiveTimeout>) -> Self {
        self.timeout = Some(TimeoutStrategy::Adaptive(timeout));
        self
    }

    /// Choose where the breaker sits relative to retries
    pub fn breaker_placement(mut self, placement: BreakerPlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Operation label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Configured breaker placement
    pub fn placement(&self) -> BreakerPlacement {
        self.placement
    }

    /// Attached breaker, if any
    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Execute `op` through every configured guard
    ///
    /// `op` is invoked once per attempt, so it must be callable repeatedly.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op = &op;
        match (&self.breaker, self.placement) {
            (Some(breaker), BreakerPlacement::Outer) => {
                breaker.execute(move || self.retried(op)).await
            }
            _ => self.retried(op).await,
        }
    }

    async fn retried<F, Fut, T>(&self, op: &F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match &self.retry {
            Some(policy) => policy.execute(move || self.attempt(op)).await,
            None => self.attempt(op).await,
        }
    }

    async fn attempt<F, Fut, T>(&self, op: &F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match (&self.breaker, self.placement) {
            (Some(breaker), BreakerPlacement::PerAttempt) => {
                breaker.execute(move || self.timed(op)).await
            }
            _ => self.timed(op).await,
        }
    }

    async fn timed<F, Fut, T>(&self, op: &F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match &self.timeout {
            Some(TimeoutStrategy::Fixed(duration)) => {
                execute_with_timeout(op, *duration, &self.label).await
            }
            Some(TimeoutStrategy::Adaptive(adaptive)) => adaptive.execute(&self.label, op).await,
            None => op().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::error::{FailureKind, ResilienceError};
    use crate::retry::RetryConfig;
    use crate::timeout::AdaptiveTimeoutConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            use_jitter: false,
            ..Default::default()
        })
    }

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "dependency",
            CircuitBreakerConfig::new(threshold, Duration::from_secs(30)),
        ))
    }

    #[tokio::test]
    async fn test_without_guards_passes_through() {
        let pipeline = ResiliencePipeline::new("plain");
        assert_eq!(pipeline.label(), "plain");

        let value = pipeline
            .execute(|| async { Ok::<_, ResilienceError>("done") })
            .await;
        assert_eq!(value.unwrap(), "done");

        let err: Result<()> = pipeline
            .execute(|| async { Err(ResilienceError::permanent("bad input")) })
            .await;
        assert_eq!(err.unwrap_err().kind(), FailureKind::PERMANENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_breaker_counts_retry_sequence_once() {
        let breaker = breaker(2);
        let pipeline = ResiliencePipeline::new("outer")
            .with_breaker(Arc::clone(&breaker))
            .with_retry(retry(3));
        let calls = AtomicU32::new(0);

        let result: Result<()> = pipeline
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::connection("refused"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), FailureKind::CONNECTION);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.failure_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_breaker_rejects_without_invoking() {
        let breaker = breaker(1);
        let pipeline = ResiliencePipeline::new("outer")
            .with_breaker(Arc::clone(&breaker))
            .with_retry(retry(2));
        let calls = AtomicU32::new(0);
        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ResilienceError::transient("down"))
        };

        assert!(pipeline.execute(op).await.is_err());
        assert!(breaker.is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let rejected = pipeline.execute(op).await.unwrap_err();
        assert!(rejected.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_attempt_breaker_stops_retries_when_open() {
        let breaker = breaker(2);
        let pipeline = ResiliencePipeline::new("per_attempt")
            .with_breaker(Arc::clone(&breaker))
            .with_retry(retry(5))
            .breaker_placement(BreakerPlacement::PerAttempt);
        assert_eq!(pipeline.placement(), BreakerPlacement::PerAttempt);
        let calls = AtomicU32::new(0);

        let result: Result<()> = pipeline
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::transient("flaky"))
            })
            .await;

        // Third attempt is rejected by the open breaker, which is not retried
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_applies_to_each_attempt() {
        let breaker = breaker(5);
        let pipeline = ResiliencePipeline::new("slow_call")
            .with_breaker(Arc::clone(&breaker))
            .with_retry(retry(2))
            .with_timeout(Duration::from_millis(100))
            .breaker_placement(BreakerPlacement::PerAttempt);
        let calls = AtomicU32::new(0);

        let result: Result<()> = pipeline
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;

        match result {
            Err(ResilienceError::Timeout { label, duration }) => {
                assert_eq!(label, "slow_call");
                assert_eq!(duration, Duration::from_millis(100));
            }
            other => panic!("Expected Timeout, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Timeouts count as breaker failures
        assert_eq!(breaker.failure_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adaptive_timeout_learns_from_pipeline() {
        let adaptive = Arc::new(AdaptiveTimeout::new(AdaptiveTimeoutConfig {
            min_timeout: Duration::from_millis(100),
            ..Default::default()
        }));
        let pipeline =
            ResiliencePipeline::new("adaptive").with_adaptive_timeout(Arc::clone(&adaptive));

        for _ in 0..10 {
            pipeline
                .execute(|| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, ResilienceError>(())
                })
                .await
                .unwrap();
        }

        assert_eq!(adaptive.sample_count(), 10);
        assert!(adaptive.current_timeout() < Duration::from_secs(30));
        assert!(adaptive.current_timeout() >= Duration::from_millis(300));
    }
}
