//! Named breakers and presets, held by an explicit context object
//!
//! A [`ResilienceRegistry`] is built once at startup and handed to every call
//! site that needs a guard. There is no process-global state: two registries
//! never share breakers, which keeps tests isolated from one another.

use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use super::error::ConfigError;
use super::retry::{RetryConfig, RetryPolicy};
use super::retry_budget::RetryBudget;
use super::timeout::TimeoutConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of circuit breakers keyed by name
///
/// The first registration of a name wins; later lookups with the same name
/// return that instance and ignore the configuration they pass.
#[derive(Debug, Clone, Default)]
pub struct BreakerRegistry {
    breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
}

impl BreakerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the breaker registered under `name`, creating it if needed
    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another caller may have inserted between the read and write locks
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(
                    breaker = name,
                    threshold = config.failure_threshold,
                    reset_timeout_ms = config.reset_timeout.as_millis() as u64,
                    "Registered circuit breaker"
                );
                Arc::new(CircuitBreaker::new(name, config))
            })
            .clone()
    }

    /// Get a registered breaker
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Snapshots of every breaker, sorted by name
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|breaker| breaker.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Force every breaker closed
    pub fn reset_all(&self) {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        for breaker in breakers.values() {
            breaker.reset();
        }
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check whether no breaker is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Context object owning every named resilience resource of a process
#[derive(Debug, Clone, Default)]
pub struct ResilienceRegistry {
    breakers: BreakerRegistry,
    retry_presets: Arc<RwLock<HashMap<String, RetryConfig>>>,
    timeout_presets: Arc<RwLock<HashMap<String, TimeoutConfig>>>,
    budget: Option<RetryBudget>,
}

impl ResilienceRegistry {
    /// Create an empty registry without a retry budget
    pub fn new() -> Self {
        Self::default()
    }

    /// Breaker registry
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Get or create a named breaker
    pub fn breaker(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers.get_or_create(name, config)
    }

    /// Register a custom retry preset, shadowing a built-in of the same name
    pub fn register_retry(
        &self,
        name: impl Into<String>,
        config: RetryConfig,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        self.retry_presets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), config);
        Ok(())
    }

    /// Register a custom timeout preset, shadowing a built-in of the same name
    pub fn register_timeout(
        &self,
        name: impl Into<String>,
        config: TimeoutConfig,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        self.timeout_presets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), config);
        Ok(())
    }

    /// Resolve a retry preset: custom names first, then built-ins
    pub fn retry_config(&self, name: &str) -> Result<RetryConfig, ConfigError> {
        let custom = self
            .retry_presets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match custom {
            Some(config) => Ok(config),
            None => RetryConfig::named(name),
        }
    }

    /// Resolve a timeout preset: custom names first, then built-ins
    pub fn timeout_config(&self, name: &str) -> Result<TimeoutConfig, ConfigError> {
        let custom = self
            .timeout_presets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match custom {
            Some(config) => Ok(config),
            None => TimeoutConfig::named(name),
        }
    }

    /// Names of the custom retry presets, sorted
    pub fn custom_retry_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .retry_presets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Names of the custom timeout presets, sorted
    pub fn custom_timeout_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .timeout_presets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Build a retry policy for a preset, wired to the shared budget
    pub fn retry_policy(&self, name: &str) -> Result<RetryPolicy, ConfigError> {
        let policy = RetryPolicy::new(self.retry_config(name)?);
        Ok(match &self.budget {
            Some(budget) => policy.with_budget(budget.clone()),
            None => policy,
        })
    }

    /// Share one retry budget across every policy handed out afterwards
    pub fn set_budget(&mut self, budget: RetryBudget) {
        self.budget = Some(budget);
    }

    /// Shared retry budget, if any
    pub fn budget(&self) -> Option<&RetryBudget> {
        self.budget.as_ref()
    }
}
