/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::RampartConfig;
use crate::error::{RampartError, Result};

/// Initialize structured logging based on configuration
pub fn init_logging(config: &RampartConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(config)))
        .map_err(|e| RampartError::Config(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = config.log_file {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_stdout_logging(env_filter);
    }

    Ok(())
}

/// Effective level: `verbose` forces debug
pub fn effective_level(config: &RampartConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Filter directives used when `RUST_LOG` is not set
pub fn default_directives(config: &RampartConfig) -> String {
    let level = effective_level(config);
    format!("rampart={},rampart_core_resilience={}", level, level)
}

/// Initialize logging to stderr, leaving stdout to command output
fn init_stdout_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Initialize logging to a file as JSON lines
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path)
        .map_err(|e| RampartError::Config(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false) // No ANSI colors in file
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Initialize logging with custom format for testing
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("rampart=debug,rampart_core_resilience=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_directives() {
        let config = RampartConfig {
            log_level: LogLevel::Warn,
            ..Default::default()
        };
        assert_eq!(
            default_directives(&config),
            "rampart=WARN,rampart_core_resilience=WARN"
        );
        assert!(EnvFilter::try_new(default_directives(&config)).is_ok());
    }

    #[test]
    fn test_verbose_overrides_log_level() {
        let config = RampartConfig {
            log_level: LogLevel::Error,
            verbose: true,
            ..Default::default()
        };
        assert_eq!(effective_level(&config), Level::DEBUG);
    }

    #[test]
    fn test_unwritable_log_file() {
        let config = RampartConfig {
            log_file: Some(std::path::PathBuf::from("/nonexistent-dir/rampart/log.json")),
            ..Default::default()
        };
        let filter = EnvFilter::new("rampart=info");
        let err = init_file_logging(config.log_file.as_deref().unwrap(), filter).unwrap_err();
        assert!(err.to_string().contains("Failed to create log file"));
    }
}
