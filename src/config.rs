/*!
 * Configuration types for Rampart
 */

use crate::error::{RampartError, Result};
use rampart_core_resilience::{
    CircuitBreakerConfig, ConfigError, FailureKind, KindFilter, ResilienceRegistry, RetryBudget,
    RetryBudgetConfig, RetryConfig, TimeoutConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration file
///
/// ```toml
/// log_level = "info"
///
/// [breakers.payments]
/// fail_threshold = 3
/// reset_timeout_secs = 15.0
/// excluded_kinds = ["not_found"]
///
/// [retry.payments]
/// preset = "http"
/// max_attempts = 4
///
/// [timeouts.payments]
/// preset = "external_api"
/// default_secs = 8.0
///
/// [budget]
/// max_retry_percent = 10.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampartConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// Named circuit breakers
    #[serde(default)]
    pub breakers: BTreeMap<String, BreakerSettings>,

    /// Custom retry presets
    #[serde(default)]
    pub retry: BTreeMap<String, RetrySettings>,

    /// Custom timeout presets
    #[serde(default)]
    pub timeouts: BTreeMap<String, TimeoutSettings>,

    /// Shared retry budget (None = retries are only bounded by attempts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetSettings>,
}

impl Default for RampartConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
            breakers: BTreeMap::new(),
            retry: BTreeMap::new(),
            timeouts: BTreeMap::new(),
            budget: None,
        }
    }
}

/// Circuit breaker section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures that open the breaker
    #[serde(default = "default_fail_threshold")]
    pub fail_threshold: u32,

    /// Cool-down before a trial call, in seconds
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: f64,

    /// Failure kinds that never count against the breaker
    #[serde(default)]
    pub excluded_kinds: Vec<String>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            fail_threshold: default_fail_threshold(),
            reset_timeout_secs: default_reset_timeout(),
            excluded_kinds: Vec::new(),
        }
    }
}

impl BreakerSettings {
    /// Convert into a validated breaker configuration
    pub fn to_config(&self) -> std::result::Result<CircuitBreakerConfig, ConfigError> {
        let reset_timeout = seconds(
            "reset_timeout_secs",
            self.reset_timeout_secs,
            ConfigError::InvalidBreaker,
        )?;
        let config = self.excluded_kinds.iter().fold(
            CircuitBreakerConfig::new(self.fail_threshold, reset_timeout),
            |config, kind| config.exclude(kind.as_str()),
        );
        config.validate()?;
        Ok(config)
    }
}

/// Custom retry preset; unset fields come from `preset` (or the defaults)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Built-in preset used as the base
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_jitter: Option<bool>,

    /// Only these kinds are retried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on: Option<Vec<String>>,

    /// Kinds never retried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub never_retry: Option<Vec<String>>,
}

impl RetrySettings {
    /// Resolve the base preset and apply overrides
    pub fn resolve(&self) -> std::result::Result<RetryConfig, ConfigError> {
        let mut config = match &self.preset {
            Some(name) => RetryConfig::named(name)?,
            None => RetryConfig::default(),
        };

        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(secs) = self.initial_delay_secs {
            config.initial_delay = seconds("initial_delay_secs", secs, ConfigError::InvalidRetry)?;
        }
        if let Some(secs) = self.max_delay_secs {
            config.max_delay = seconds("max_delay_secs", secs, ConfigError::InvalidRetry)?;
        }
        if let Some(base) = self.backoff_base {
            config.backoff_base = base;
        }
        if let Some(jitter) = self.use_jitter {
            config.use_jitter = jitter;
        }
        if let Some(kinds) = &self.retry_on {
            config.retryable_kinds = KindFilter::only(kinds.iter().map(String::as_str));
        }
        if let Some(kinds) = &self.never_retry {
            config.excluded_kinds = kinds.iter().map(|k| FailureKind::new(k.as_str())).collect();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Custom timeout preset; unset fields come from `preset` (or the defaults)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Built-in preset used as the base
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_secs: Option<f64>,
}

impl TimeoutSettings {
    /// Resolve the base preset and apply overrides
    pub fn resolve(&self) -> std::result::Result<TimeoutConfig, ConfigError> {
        let mut config = match &self.preset {
            Some(name) => TimeoutConfig::named(name)?,
            None => TimeoutConfig::default(),
        };

        let overrides = [
            ("default_secs", self.default_secs, &mut config.default_timeout),
            ("connect_secs", self.connect_secs, &mut config.connect_timeout),
            ("read_secs", self.read_secs, &mut config.read_timeout),
            ("write_secs", self.write_secs, &mut config.write_timeout),
        ];
        for (field, value, target) in overrides {
            if let Some(secs) = value {
                *target = seconds(field, secs, ConfigError::InvalidTimeout)?;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Shared retry budget section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Sliding window, in seconds
    #[serde(default = "default_budget_window")]
    pub window_secs: f64,

    /// Maximum share of requests that may be retries
    #[serde(default = "default_max_retry_percent")]
    pub max_retry_percent: f64,

    /// Retries per second always allowed
    #[serde(default = "default_min_retries_per_second")]
    pub min_retries_per_second: f64,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            window_secs: default_budget_window(),
            max_retry_percent: default_max_retry_percent(),
            min_retries_per_second: default_min_retries_per_second(),
        }
    }
}

impl BudgetSettings {
    /// Convert into a validated budget configuration
    pub fn to_config(&self) -> std::result::Result<RetryBudgetConfig, ConfigError> {
        let config = RetryBudgetConfig {
            window: seconds("window_secs", self.window_secs, ConfigError::InvalidBudget)?,
            max_retry_percent: self.max_retry_percent,
            min_retries_per_second: self.min_retries_per_second,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_fail_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> f64 {
    30.0
}

fn default_budget_window() -> f64 {
    10.0
}

fn default_max_retry_percent() -> f64 {
    20.0
}

fn default_min_retries_per_second() -> f64 {
    10.0
}

/// Parse a fractional number of seconds
fn seconds(
    field: &str,
    secs: f64,
    error: fn(String) -> ConfigError,
) -> std::result::Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        error(format!(
            "{} must be a non-negative number of seconds, got {}",
            field, secs
        ))
    })
}

/// Prefix a configuration error with the section it came from
fn in_section(section: String, err: ConfigError) -> ConfigError {
    match err {
        ConfigError::InvalidRetry(msg) => ConfigError::InvalidRetry(format!("{}: {}", section, msg)),
        ConfigError::InvalidTimeout(msg) => {
            ConfigError::InvalidTimeout(format!("{}: {}", section, msg))
        }
        ConfigError::InvalidBreaker(msg) => {
            ConfigError::InvalidBreaker(format!("{}: {}", section, msg))
        }
        ConfigError::InvalidBudget(msg) => {
            ConfigError::InvalidBudget(format!("{}: {}", section, msg))
        }
        unknown @ ConfigError::UnknownPreset { .. } => unknown,
    }
}

impl RampartConfig {
    /// Configuration written by `rampart init`: one breaker with matching
    /// retry and timeout presets, plus a retry budget
    pub fn starter() -> Self {
        let mut config = Self::default();
        config.breakers.insert(
            "drill".to_string(),
            BreakerSettings {
                excluded_kinds: vec!["not_found".to_string()],
                ..Default::default()
            },
        );
        config.retry.insert(
            "drill".to_string(),
            RetrySettings {
                preset: Some("http".to_string()),
                max_attempts: Some(4),
                ..Default::default()
            },
        );
        config.timeouts.insert(
            "drill".to_string(),
            TimeoutSettings {
                preset: Some("fast".to_string()),
                default_secs: Some(2.0),
                ..Default::default()
            },
        );
        config.budget = Some(BudgetSettings::default());
        config
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| RampartError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| RampartError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check every section without building anything
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, settings) in &self.breakers {
            settings
                .to_config()
                .map_err(|e| in_section(format!("[breakers.{}]", name), e))?;
        }
        for (name, settings) in &self.retry {
            settings
                .resolve()
                .map_err(|e| in_section(format!("[retry.{}]", name), e))?;
        }
        for (name, settings) in &self.timeouts {
            settings
                .resolve()
                .map_err(|e| in_section(format!("[timeouts.{}]", name), e))?;
        }
        if let Some(budget) = &self.budget {
            budget
                .to_config()
                .map_err(|e| in_section("[budget]".to_string(), e))?;
        }
        Ok(())
    }

    /// Build a registry holding every configured breaker, preset and budget
    pub fn build_registry(&self) -> std::result::Result<ResilienceRegistry, ConfigError> {
        self.validate()?;

        let mut registry = ResilienceRegistry::new();
        for (name, settings) in &self.breakers {
            registry.breaker(name, settings.to_config()?);
        }
        for (name, settings) in &self.retry {
            registry.register_retry(name.as_str(), settings.resolve()?)?;
        }
        for (name, settings) in &self.timeouts {
            registry.register_timeout(name.as_str(), settings.resolve()?)?;
        }
        if let Some(budget) = &self.budget {
            registry.set_budget(RetryBudget::new(budget.to_config()?));
        }

        tracing::debug!(
            breakers = self.breakers.len(),
            retry_presets = self.retry.len(),
            timeout_presets = self.timeouts.len(),
            budget = self.budget.is_some(),
            "Built resilience registry from configuration"
        );
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
log_level = "debug"

[breakers.payments]
fail_threshold = 3
reset_timeout_secs = 15.5
excluded_kinds = ["not_found"]

[breakers.search]

[retry.payments]
preset = "http"
max_attempts = 4
never_retry = ["circuit_open", "permanent"]

[retry.reads]
initial_delay_secs = 0.25
retry_on = ["connection", "timeout"]

[timeouts.payments]
preset = "external_api"
default_secs = 8.0

[budget]
max_retry_percent = 10.0
"#;

    #[test]
    fn test_starter_config_is_valid() {
        let config = RampartConfig::starter();
        let registry = config.build_registry().unwrap();

        assert!(registry.breakers().get("drill").is_some());
        assert_eq!(registry.retry_config("drill").unwrap().max_attempts, 4);
        assert_eq!(
            registry.timeout_config("drill").unwrap().default_timeout,
            Duration::from_secs(2)
        );
        assert!(registry.budget().is_some());
    }

    #[test]
    fn test_default_config() {
        let config = RampartConfig::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.breakers.is_empty());
        assert!(config.budget.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_config() {
        let config: RampartConfig = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);

        let payments = config.breakers["payments"].to_config().unwrap();
        assert_eq!(payments.failure_threshold, 3);
        assert_eq!(payments.reset_timeout, Duration::from_millis(15_500));
        assert!(payments.excluded_kinds.contains(&FailureKind::new("not_found")));

        let search = &config.breakers["search"];
        assert_eq!(search, &BreakerSettings::default());

        let retry = config.retry["payments"].resolve().unwrap();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.max_delay, Duration::from_secs(10));
        assert!(!retry.should_retry(&rampart_core_resilience::ResilienceError::permanent("no")));

        let reads = config.retry["reads"].resolve().unwrap();
        assert_eq!(reads.initial_delay, Duration::from_millis(250));
        assert_eq!(
            reads.retryable_kinds,
            KindFilter::only([FailureKind::CONNECTION, FailureKind::TIMEOUT])
        );

        let timeouts = config.timeouts["payments"].resolve().unwrap();
        assert_eq!(timeouts.default_timeout, Duration::from_secs(8));
        assert_eq!(timeouts.write_timeout, Duration::from_secs(10));

        let budget = config.budget.as_ref().unwrap().to_config().unwrap();
        assert_eq!(budget.window, Duration::from_secs(10));
        assert_eq!(budget.max_retry_percent, 10.0);
    }

    #[test]
    fn test_serialization_round_trip() {
        let config: RampartConfig = toml::from_str(EXAMPLE).unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RampartConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validation_names_section() {
        let mut config = RampartConfig::default();
        config.retry.insert(
            "broken".to_string(),
            RetrySettings {
                max_attempts: Some(0),
                ..Default::default()
            },
        );

        match config.validate() {
            Err(ConfigError::InvalidRetry(msg)) => assert!(msg.starts_with("[retry.broken]")),
            other => panic!("Expected InvalidRetry, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_seconds_rejected() {
        let settings = BreakerSettings {
            reset_timeout_secs: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.to_config(),
            Err(ConfigError::InvalidBreaker(_))
        ));

        let settings = TimeoutSettings {
            read_secs: Some(f64::NAN),
            ..Default::default()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_unknown_base_preset() {
        let settings = TimeoutSettings {
            preset: Some("sluggish".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::UnknownPreset { family: "timeout", .. })
        ));
    }

    #[test]
    fn test_build_registry() {
        let config: RampartConfig = toml::from_str(EXAMPLE).unwrap();
        let registry = config.build_registry().unwrap();

        assert_eq!(
            registry.breakers().names(),
            vec!["payments".to_string(), "search".to_string()]
        );
        assert_eq!(registry.retry_config("payments").unwrap().max_attempts, 4);
        assert_eq!(registry.retry_config("aggressive").unwrap().max_attempts, 5);
        assert_eq!(
            registry.timeout_config("payments").unwrap().default_timeout,
            Duration::from_secs(8)
        );
        assert!(registry.budget().is_some());
        assert!(registry.retry_policy("reads").unwrap().budget().is_some());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
