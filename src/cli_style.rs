/*!
 * Rampart CLI Style System
 *
 * Themed text, tables and status lines shared by the CLI subcommands.
 */

use crate::drill::DrillReport;
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use rampart_core_resilience::{
    BreakerSnapshot, BudgetStats, CircuitState, FailureKind, KindFilter, RetryBudgetConfig,
    RetryConfig, TimeoutConfig,
};
use std::collections::HashSet;
use std::time::Duration;

// ============================================================================
// THEME COLORS
// ============================================================================

/// Brand colors for consistent styling
pub struct Theme;

impl Theme {
    /// Primary accent color (cyan/blue)
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    /// Success color (green)
    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    /// Warning color (yellow)
    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    /// Error color (red)
    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    /// Muted/secondary text (dim)
    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }

    /// Header style (bold cyan)
    pub fn header<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan().bold()
    }
}

// ============================================================================
// ICONS
// ============================================================================

/// Unicode icons for visual feedback
pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
    pub const ARROW_RIGHT: &'static str = "→";
}

/// Draw a section header with a line
pub fn section_header(title: &str) {
    let line_len = 50 - title.len().min(40);
    println!(
        "\n{} {}",
        Theme::header(title),
        Theme::muted("─".repeat(line_len))
    );
}

// ============================================================================
// TABLES
// ============================================================================

/// Create a styled data table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Create a minimal table (no outer borders)
pub fn create_minimal_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text).fg(Color::Cyan).add_attribute(Attribute::Bold)
}

/// Retry presets side by side
pub fn retry_preset_table(presets: &[(String, RetryConfig)]) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Preset"),
        header_cell("Attempts"),
        header_cell("Initial"),
        header_cell("Max Delay"),
        header_cell("Base"),
        header_cell("Jitter"),
        header_cell("Retries On"),
    ]);

    for (name, config) in presets {
        let retries_on = match &config.retryable_kinds {
            KindFilter::Any => "any".to_string(),
            KindFilter::Only(kinds) => kind_list(kinds),
        };
        let retries_on = if config.excluded_kinds.is_empty() {
            retries_on
        } else {
            format!("{} (not {})", retries_on, kind_list(&config.excluded_kinds))
        };

        table.add_row(vec![
            Cell::new(name).fg(Color::White).add_attribute(Attribute::Bold),
            Cell::new(config.max_attempts),
            Cell::new(format_duration(config.initial_delay)),
            Cell::new(format_duration(config.max_delay)),
            Cell::new(format!("{}x", config.backoff_base)),
            bool_cell(config.use_jitter),
            Cell::new(retries_on).fg(Color::DarkGrey),
        ]);
    }

    table
}

/// Timeout presets side by side
pub fn timeout_preset_table(presets: &[(String, TimeoutConfig)]) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Preset"),
        header_cell("Default"),
        header_cell("Connect"),
        header_cell("Read"),
        header_cell("Write"),
    ]);

    for (name, config) in presets {
        table.add_row(vec![
            Cell::new(name).fg(Color::White).add_attribute(Attribute::Bold),
            Cell::new(format_duration(config.default_timeout)),
            Cell::new(format_duration(config.connect_timeout)),
            Cell::new(format_duration(config.read_timeout)),
            Cell::new(format_duration(config.write_timeout)),
        ]);
    }

    table
}

/// Breaker states, one row per breaker
pub fn breaker_table(snapshots: &[BreakerSnapshot]) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Breaker"),
        header_cell("State"),
        header_cell("Failures"),
        header_cell("Cooldown"),
    ]);

    for snapshot in snapshots {
        table.add_row(vec![
            Cell::new(&snapshot.name).fg(Color::White).add_attribute(Attribute::Bold),
            state_cell(snapshot.state),
            Cell::new(format!(
                "{}/{}",
                snapshot.failure_count, snapshot.failure_threshold
            )),
            Cell::new(format_duration(Duration::from_secs_f64(
                snapshot.remaining_cooldown_secs.max(0.0),
            ))),
        ]);
    }

    table
}

/// Retry budget limits and, when available, its current counts
pub fn budget_table(config: &RetryBudgetConfig, stats: Option<BudgetStats>) -> Table {
    let mut items = vec![
        ("Window", format_duration(config.window)),
        ("Max Retry Share", format!("{}%", config.max_retry_percent)),
        ("Min Retries/s", config.min_retries_per_second.to_string()),
    ];
    if let Some(stats) = stats {
        items.push(("Requests", stats.requests.to_string()));
        items.push(("Retries", stats.retries.to_string()));
        items.push(("Retry Share", format!("{:.1}%", stats.retry_percent)));
    }

    let mut table = create_minimal_table();
    for (key, value) in items {
        table.add_row(vec![
            Cell::new(key).fg(Color::Cyan),
            Cell::new(value).fg(Color::White).add_attribute(Attribute::Bold),
        ]);
    }
    table
}

/// Outcome counts of a drill
pub fn drill_summary_table(report: &DrillReport) -> Table {
    let mut table = create_table();
    table.set_header(vec![header_cell("Drill Summary"), Cell::new("")]);

    table.add_row(vec![
        Cell::new("Calls"),
        Cell::new(report.calls).fg(Color::White).add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("Succeeded"),
        Cell::new(format!(
            "{} ({:.1}%)",
            report.successes,
            report.success_rate() * 100.0
        ))
        .fg(Color::Green)
        .add_attribute(Attribute::Bold),
    ]);

    if report.failures > 0 {
        table.add_row(vec![
            Cell::new("Failed"),
            Cell::new(report.failures).fg(Color::Red).add_attribute(Attribute::Bold),
        ]);
    }
    if report.timeouts > 0 {
        table.add_row(vec![
            Cell::new("Timed Out"),
            Cell::new(report.timeouts).fg(Color::Yellow),
        ]);
    }
    if report.rejected > 0 {
        table.add_row(vec![
            Cell::new("Rejected (open)"),
            Cell::new(report.rejected).fg(Color::Magenta),
        ]);
    }

    table.add_row(vec![
        Cell::new("Dependency Calls"),
        Cell::new(report.invocations).fg(Color::White),
    ]);
    table.add_row(vec![
        Cell::new("Elapsed"),
        Cell::new(format_duration(Duration::from_millis(report.elapsed_ms))).fg(Color::White),
    ]);
    table.add_row(vec![
        Cell::new("Breaker"),
        state_cell(report.breaker.state),
    ]);

    table
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Create a boolean status cell
fn bool_cell(value: bool) -> Cell {
    if value {
        Cell::new(format!("{} Yes", Icons::SUCCESS)).fg(Color::Green)
    } else {
        Cell::new(format!("{} No", Icons::ERROR)).fg(Color::DarkGrey)
    }
}

fn state_cell(state: CircuitState) -> Cell {
    let color = match state {
        CircuitState::Closed => Color::Green,
        CircuitState::HalfOpen => Color::Yellow,
        CircuitState::Open => Color::Red,
    };
    Cell::new(state_label(state)).fg(color)
}

fn state_label(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::HalfOpen => "half-open",
        CircuitState::Open => "open",
    }
}

/// Sorted, comma-separated kind names
fn kind_list(kinds: &HashSet<FailureKind>) -> String {
    let mut names: Vec<&str> = kinds.iter().map(FailureKind::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}

/// Format duration into human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining = secs % 60.0;
        format!("{}m {:.0}s", mins, remaining)
    } else {
        let hours = (secs / 3600.0).floor();
        let mins = ((secs % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours, mins)
    }
}

/// Print a styled error message with optional suggestion
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "\n{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
    eprintln!();
}

/// Print a styled warning message
pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

/// Print a styled success message
pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

/// Print a styled info message
pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO.to_string()), message);
}

// ============================================================================
// TESTS
// ============================================================================
