/*!
 * Resilience drills: run a configured pipeline against a synthetic dependency
 *
 * A drill answers "what would these settings do against a dependency that
 * fails this often and responds this slowly?" without touching a real
 * service. The dependency draws from a seeded RNG, so two drills with the same
 * options and a concurrency of one produce identical reports.
 */

use crate::error::{RampartError, Result};
use futures::stream::{self, StreamExt};
use rampart_core_resilience::{
    BreakerPlacement, BreakerSnapshot, BudgetStats, CircuitBreakerConfig, FailureKind,
    ResilienceError, ResiliencePipeline, ResilienceRegistry,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Simulated downstream dependency with a configurable failure rate
#[derive(Debug, Clone)]
pub struct FlakyDependency {
    failure_rate: f64,
    latency: Duration,
    latency_jitter: Duration,
    failure_kind: FailureKind,
    rng: Arc<Mutex<StdRng>>,
    invocations: Arc<AtomicU64>,
}

impl FlakyDependency {
    /// Create a dependency failing with probability `failure_rate` (0.0 - 1.0)
    pub fn new(failure_rate: f64, latency: Duration, seed: u64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };

        Self {
            failure_rate,
            latency,
            latency_jitter: Duration::ZERO,
            failure_kind: FailureKind::TRANSIENT,
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
            invocations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add up to `jitter` of random extra latency per call
    pub fn with_latency_jitter(mut self, jitter: Duration) -> Self {
        self.latency_jitter = jitter;
        self
    }

    /// Kind attached to synthetic failures
    pub fn with_failure_kind(mut self, kind: impl Into<FailureKind>) -> Self {
        self.failure_kind = kind.into();
        self
    }

    /// Effective failure probability
    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// Number of times the dependency was actually called
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Perform one call; returns the call's sequence number on success
    pub async fn call(&self) -> std::result::Result<u64, ResilienceError> {
        let call = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;

        let (fails, extra) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let fails = rng.random_bool(self.failure_rate);
            let jitter_nanos = u64::try_from(self.latency_jitter.as_nanos()).unwrap_or(u64::MAX);
            let extra = if jitter_nanos == 0 {
                0
            } else {
                rng.random_range(0..=jitter_nanos)
            };
            (fails, Duration::from_nanos(extra))
        };

        tokio::time::sleep(self.latency + extra).await;

        if fails {
            Err(ResilienceError::operation(
                self.failure_kind.clone(),
                format!("synthetic failure on call {}", call),
            ))
        } else {
            Ok(call)
        }
    }
}

/// How a drill exercises the registry
#[derive(Debug, Clone, PartialEq)]
pub struct DrillOptions {
    /// Number of protected calls
    pub calls: usize,
    /// Calls kept in flight at once
    pub concurrency: usize,
    /// Breaker name; created with defaults when not configured
    pub breaker: String,
    /// Retry preset (None = no retries)
    pub retry_preset: Option<String>,
    /// Timeout preset whose `default_timeout` bounds each attempt (None = no timeout)
    pub timeout_preset: Option<String>,
    /// Breaker placement relative to retries
    pub placement: BreakerPlacement,
    /// Seed of the synthetic dependency
    pub seed: u64,
}

impl Default for DrillOptions {
    fn default() -> Self {
        Self {
            calls: 100,
            concurrency: 4,
            breaker: "drill".to_string(),
            retry_preset: Some("default".to_string()),
            timeout_preset: Some("fast".to_string()),
            placement: BreakerPlacement::Outer,
            seed: 42,
        }
    }
}

/// Outcome counts of a drill
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrillReport {
    /// Protected calls issued
    pub calls: usize,
    /// Calls that returned a value
    pub successes: usize,
    /// Calls that returned the dependency's own failure
    pub failures: usize,
    /// Calls that ended in a timeout
    pub timeouts: usize,
    /// Calls rejected by an open breaker
    pub rejected: usize,
    /// Times the dependency itself was invoked (includes retries)
    pub invocations: u64,
    /// Breaker placement used
    pub placement: BreakerPlacement,
    /// Simulated wall time of the drill, in milliseconds
    pub elapsed_ms: u64,
    /// Breaker state after the drill
    pub breaker: BreakerSnapshot,
    /// Retry budget counts after the drill, when a budget is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetStats>,
}

impl DrillReport {
    /// Share of calls that succeeded (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.successes as f64 / self.calls as f64
        }
    }
}

/// Run `options.calls` protected calls against `dependency`
pub async fn run_drill(
    registry: &ResilienceRegistry,
    options: &DrillOptions,
    dependency: &FlakyDependency,
) -> Result<DrillReport> {
    if options.calls == 0 {
        return Err(RampartError::Drill("calls must be at least 1".to_string()));
    }
    if options.concurrency == 0 {
        return Err(RampartError::Drill(
            "concurrency must be at least 1".to_string(),
        ));
    }

    let breaker = registry.breaker(&options.breaker, CircuitBreakerConfig::default());
    let mut pipeline = ResiliencePipeline::new(format!("drill:{}", options.breaker))
        .with_breaker(Arc::clone(&breaker))
        .breaker_placement(options.placement);
    if let Some(preset) = &options.retry_preset {
        pipeline = pipeline.with_retry(registry.retry_policy(preset)?);
    }
    if let Some(preset) = &options.timeout_preset {
        pipeline = pipeline.with_timeout(registry.timeout_config(preset)?.default_timeout);
    }

    tracing::info!(
        breaker = %options.breaker,
        calls = options.calls,
        concurrency = options.concurrency,
        failure_rate = dependency.failure_rate(),
        "Starting drill"
    );

    let invocations_before = dependency.invocations();
    let start = Instant::now();

    let outcomes: Vec<std::result::Result<u64, ResilienceError>> = stream::iter(0..options.calls)
        .map(|_| pipeline.execute(|| dependency.call()))
        .buffer_unordered(options.concurrency)
        .collect()
        .await;

    let mut report = DrillReport {
        calls: options.calls,
        successes: 0,
        failures: 0,
        timeouts: 0,
        rejected: 0,
        invocations: dependency.invocations() - invocations_before,
        placement: options.placement,
        elapsed_ms: start.elapsed().as_millis() as u64,
        breaker: breaker.snapshot(),
        budget: registry.budget().map(|budget| budget.stats()),
    };
    for outcome in &outcomes {
        match outcome {
            Ok(_) => report.successes += 1,
            Err(ResilienceError::CircuitOpen { .. }) => report.rejected += 1,
            Err(ResilienceError::Timeout { .. }) => report.timeouts += 1,
            Err(ResilienceError::Operation { .. }) => report.failures += 1,
        }
    }

    tracing::info!(
        successes = report.successes,
        failures = report.failures,
        timeouts = report.timeouts,
        rejected = report.rejected,
        invocations = report.invocations,
        "Drill finished"
    );
    Ok(report)
}
