/*!
 * Error types for Rampart
 */

use rampart_core_resilience::ConfigError;
use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RampartError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum RampartError {
    /// I/O error
    Io(io::Error),

    /// Configuration file could not be read or parsed
    ConfigLoad { path: PathBuf, message: String },

    /// Configuration value or preset name rejected
    InvalidConfig(ConfigError),

    /// Generic configuration error
    Config(String),

    /// Drill could not be run
    Drill(String),

    /// Generic error with message
    Other(String),
}

impl RampartError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RampartError::ConfigLoad { .. }
            | RampartError::InvalidConfig(_)
            | RampartError::Config(_)
            | RampartError::Drill(_) => EXIT_FATAL,
            RampartError::Io(_) | RampartError::Other(_) => EXIT_PARTIAL,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            RampartError::Io(_) => ErrorCategory::IoError,
            RampartError::ConfigLoad { .. }
            | RampartError::InvalidConfig(_)
            | RampartError::Config(_) => ErrorCategory::Configuration,
            RampartError::Drill(_) => ErrorCategory::Drill,
            RampartError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// I/O operation errors
    IoError,
    /// Configuration errors
    Configuration,
    /// Drill setup errors
    Drill,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Drill => write!(f, "drill"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for RampartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RampartError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            RampartError::ConfigLoad { path, message } => {
                write!(
                    f,
                    "Failed to load configuration {}: {}",
                    path.display(),
                    message
                )
            }
            RampartError::InvalidConfig(err) => {
                write!(f, "{}", err)
            }
            RampartError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            RampartError::Drill(msg) => {
                write!(f, "Drill error: {}", msg)
            }
            RampartError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for RampartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RampartError::Io(err) => Some(err),
            RampartError::InvalidConfig(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RampartError {
    fn from(err: io::Error) -> Self {
        RampartError::Io(err)
    }
}

impl From<ConfigError> for RampartError {
    fn from(err: ConfigError) -> Self {
        RampartError::InvalidConfig(err)
    }
}

impl From<toml::ser::Error> for RampartError {
    fn from(err: toml::ser::Error) -> Self {
        RampartError::Config(format!("TOML serialization error: {}", err))
    }
}

impl From<serde_json::Error> for RampartError {
    fn from(err: serde_json::Error) -> Self {
        RampartError::Other(format!("JSON error: {}", err))
    }
}
