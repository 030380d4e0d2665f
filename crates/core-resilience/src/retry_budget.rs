//! Retry Budget: cap on the share of traffic that may be retries
//!
//! A budget is shared by every caller of a dependency, independent of any
//! single operation's own attempt count. It keeps two time-stamped logs
//! (original requests and retries) pruned to a sliding window, and refuses
//! further retries once they exceed a percentage of the requests seen in that
//! window. A floor rate of retries is always allowed so that isolated clients
//! with little traffic are never starved.
//!
//! # Example
//!
//! ```
//! use rampart_core_resilience::retry_budget::{RetryBudget, RetryBudgetConfig};
//!
//! let budget = RetryBudget::new(RetryBudgetConfig::default());
//!
//! budget.record_request();
//! assert!(budget.can_retry());
//! budget.record_retry();
//! ```

use super::error::ConfigError;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for a retry budget
#[derive(Debug, Clone, PartialEq)]
pub struct RetryBudgetConfig {
    /// Sliding window over which requests and retries are counted
    pub window: Duration,
    /// Maximum percentage of requests that may be retries (0.0 - 100.0)
    pub max_retry_percent: f64,
    /// Retries per second that are always allowed regardless of percentage
    pub min_retries_per_second: f64,
}

impl Default for RetryBudgetConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            max_retry_percent: 20.0,
            min_retries_per_second: 10.0,
        }
    }
}

impl RetryBudgetConfig {
    /// Check the configuration invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::InvalidBudget(
                "window must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.max_retry_percent) {
            return Err(ConfigError::InvalidBudget(format!(
                "max_retry_percent must be within 0-100, got {}",
                self.max_retry_percent
            )));
        }
        if self.min_retries_per_second < 0.0 {
            return Err(ConfigError::InvalidBudget(
                "min_retries_per_second must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counts currently inside the window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetStats {
    /// Original requests in the window
    pub requests: usize,
    /// Retries in the window
    pub retries: usize,
    /// Retries as a percentage of requests (0 when no requests)
    pub retry_percent: f64,
}

#[derive(Debug, Default)]
struct BudgetLog {
    requests: VecDeque<Instant>,
    retries: VecDeque<Instant>,
}

impl BudgetLog {
    fn prune(&mut self, now: Instant, window: Duration) {
        // Timestamps are appended in order, so expired entries sit at the front
        while let Some(&t) = self.requests.front() {
            if now.saturating_duration_since(t) >= window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
        while let Some(&t) = self.retries.front() {
            if now.saturating_duration_since(t) >= window {
                self.retries.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window limiter on the fraction of traffic that may be retries
///
/// Cloning is cheap; clones share the same logs.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    config: Arc<RetryBudgetConfig>,
    log: Arc<Mutex<BudgetLog>>,
}

impl RetryBudget {
    /// Create a new retry budget
    pub fn new(config: RetryBudgetConfig) -> Self {
        Self {
            config: Arc::new(config),
            log: Arc::new(Mutex::new(BudgetLog::default())),
        }
    }

    /// Budget configuration
    pub fn config(&self) -> &RetryBudgetConfig {
        &self.config
    }

    /// Record an original (non-retry) request
    pub fn record_request(&self) {
        let now = Instant::now();
        let mut log = self.lock();
        log.requests.push_back(now);
        log.prune(now, self.config.window);
    }

    /// Record a retry attempt
    pub fn record_retry(&self) {
        let now = Instant::now();
        let mut log = self.lock();
        log.retries.push_back(now);
        log.prune(now, self.config.window);
    }

    /// Check whether a retry is allowed right now
    pub fn can_retry(&self) -> bool {
        let stats = self.stats();

        let retry_rate = stats.retries as f64 / self.config.window.as_secs_f64();
        if retry_rate < self.config.min_retries_per_second {
            return true;
        }

        if stats.requests == 0 {
            return true;
        }

        stats.retry_percent < self.config.max_retry_percent
    }

    /// Counts inside the current window
    pub fn stats(&self) -> BudgetStats {
        let now = Instant::now();
        let mut log = self.lock();
        log.prune(now, self.config.window);

        let requests = log.requests.len();
        let retries = log.retries.len();
        let retry_percent = if requests == 0 {
            0.0
        } else {
            retries as f64 / requests as f64 * 100.0
        };

        BudgetStats {
            requests,
            retries,
            retry_percent,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BudgetLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(RetryBudgetConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(percent: f64, floor: f64) -> RetryBudget {
        RetryBudget::new(RetryBudgetConfig {
            window: Duration::from_secs(10),
            max_retry_percent: percent,
            min_retries_per_second: floor,
        })
    }

    #[test]
    fn test_default_config() {
        let config = RetryBudgetConfig::default();
        assert_eq!(config.window, Duration::from_secs(10));
        assert_eq!(config.max_retry_percent, 20.0);
        assert_eq!(config.min_retries_per_second, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = RetryBudgetConfig {
            window: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RetryBudgetConfig {
            max_retry_percent: 150.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_floor_always_allows() {
        // 10s window with a floor of 1 retry/s: up to 9 retries stay below the floor
        let budget = budget(0.0, 1.0);
        for _ in 0..100 {
            budget.record_request();
        }
        for _ in 0..10 {
            assert!(budget.can_retry());
            budget.record_retry();
        }
        // 10 retries / 10s = 1.0/s, no longer below the floor, and 0% budget
        assert!(!budget.can_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn test_percentage_limit_above_floor() {
        let budget = budget(20.0, 0.1);
        for _ in 0..10 {
            budget.record_request();
        }
        budget.record_retry();
        assert!(budget.can_retry()); // 10% < 20%

        budget.record_retry();
        assert!(!budget.can_retry()); // 20% is not below 20%

        let stats = budget.stats();
        assert_eq!(stats.requests, 10);
        assert_eq!(stats.retries, 2);
        assert!((stats.retry_percent - 20.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_requests_allows() {
        let budget = budget(1.0, 0.0);
        budget.record_retry();
        assert!(budget.can_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry() {
        let budget = budget(20.0, 0.1);
        for _ in 0..5 {
            budget.record_request();
            budget.record_retry();
        }
        assert!(!budget.can_retry());

        tokio::time::advance(Duration::from_secs(11)).await;

        let stats = budget.stats();
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.retries, 0);
        assert!(budget.can_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_logs() {
        let budget = budget(20.0, 0.1);
        let other = budget.clone();

        other.record_request();
        other.record_retry();

        assert_eq!(budget.stats().requests, 1);
        assert_eq!(budget.stats().retries, 1);
    }
}
