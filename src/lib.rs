/*!
 * Rampart - resilience guards for calls to unreliable dependencies
 *
 * Builds on `rampart-core-resilience` with:
 * - TOML configuration of breakers, retry and timeout presets, and a retry budget
 * - Structured logging to the terminal or a JSON log file
 * - Drills that run a configured pipeline against a seeded synthetic dependency
 * - Styled tables for the command line interface
 */

pub mod cli_style;
pub mod config;
pub mod drill;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{LogLevel, RampartConfig};
pub use drill::{run_drill, DrillOptions, DrillReport, FlakyDependency};
pub use error::{RampartError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
