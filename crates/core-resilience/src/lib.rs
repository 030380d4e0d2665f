//! Rampart Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides building blocks for protecting calls to unreliable
//! downstream dependencies. It includes:
//!
//! - **Circuit Breaker**: Fails fast while a dependency is unhealthy, probing it with a single trial call after a cool-down
//! - **Retry Policy**: Exponential backoff with full jitter and kind-based retry rules
//! - **Retry Budget**: Sliding-window cap on the share of traffic that may be retries
//! - **Timeout Guards**: Fixed deadlines and percentile-tuned adaptive deadlines
//! - **Pipeline**: Composition of the guards around one operation
//! - **Registry**: Named breakers and presets owned by an explicit context object
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Transports (HTTP, database drivers, queues)
//! - Configuration files and logging sinks
//! - Application-specific concerns
//!
//! Guards classify failures only through the [`FailureKind`] the caller
//! attaches to a [`ResilienceError`]; they never inspect error content.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Tracks failures, opens on threshold)  │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Retry Policy                      │  ← Backoff + full jitter
//! │  (Consults the shared retry budget)     │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Timeout Guard                     │  ← Bounded attempts
//! │  (Fixed or adaptive percentile)         │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         External Dependency
//!        (API, Database, Cache)
//! ```
//!
//! # Usage Example
//!
//! ## Basic Circuit Breaker
//!
//! ```no_run
//! use rampart_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let config = CircuitBreakerConfig::new(3, Duration::from_secs(1));
//! let breaker = CircuitBreaker::new("billing", config);
//!
//! let result = breaker.execute(|| async {
//!     // Your potentially failing operation
//!     Ok::<_, ResilienceError>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Explicit Nesting
//!
//! ```no_run
//! use rampart_core_resilience::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ResilienceRegistry::new();
//! let breaker = registry.breaker("search", CircuitBreakerConfig::default());
//! let retry = registry.retry_policy("http")?;
//! let guard = TimeoutGuard::new("search_query", Duration::from_secs(2));
//!
//! let hits = breaker
//!     .execute(|| retry.execute(|| guard.execute(|| async { Ok::<_, ResilienceError>(3) })))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod retry_budget;
pub mod timeout;

// Re-export main types for convenience
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{ConfigError, FailureKind, KindFilter, ResilienceError, Result};
pub use pipeline::{BreakerPlacement, ResiliencePipeline, TimeoutStrategy};
pub use registry::{BreakerRegistry, ResilienceRegistry};
pub use retry::{execute_with_retry, retry_on_result, RetryConfig, RetryPolicy, RetryPreset};
pub use retry_budget::{BudgetStats, RetryBudget, RetryBudgetConfig};
pub use timeout::{
    execute_with_timeout, AdaptiveTimeout, AdaptiveTimeoutConfig, TimeoutConfig, TimeoutGuard,
    TimeoutPreset,
};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use rampart_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use super::error::{ConfigError, FailureKind, KindFilter, ResilienceError};
    pub use super::pipeline::{BreakerPlacement, ResiliencePipeline};
    pub use super::registry::{BreakerRegistry, ResilienceRegistry};
    pub use super::retry::{RetryConfig, RetryPolicy, RetryPreset};
    pub use super::retry_budget::{RetryBudget, RetryBudgetConfig};
    pub use super::timeout::{
        AdaptiveTimeout, AdaptiveTimeoutConfig, TimeoutConfig, TimeoutGuard, TimeoutPreset,
    };
}
