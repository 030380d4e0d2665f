/*!
 * Rampart CLI - Command Line Interface
 *
 * Inspect resilience presets, validate a configuration file, and run drills
 * against a synthetic dependency.
 */

use clap::{Parser, Subcommand, ValueEnum};
use rampart::{
    cli_style::{
        self, breaker_table, budget_table, drill_summary_table, print_info, print_success,
        retry_preset_table, section_header, timeout_preset_table, Theme,
    },
    config::{LogLevel, RampartConfig},
    drill::{run_drill, DrillOptions, FlakyDependency},
    error::{RampartError, Result, EXIT_SUCCESS},
    logging,
};
use rampart_core_resilience::{
    BreakerPlacement, ResilienceRegistry, RetryConfig, RetryPreset, TimeoutConfig, TimeoutPreset,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rampart")]
#[command(version, about = "Circuit breakers, retries and timeouts for unreliable dependencies", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show built-in and configured retry and timeout presets
    Presets,

    /// Validate a configuration file and show what it defines
    Check,

    /// Write a starter configuration file
    Init {
        /// Where to write the file
        #[arg(value_name = "FILE", default_value = "rampart.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run protected calls against a synthetic flaky dependency
    Drill(DrillArgs),
}

#[derive(clap::Args)]
struct DrillArgs {
    /// Number of protected calls
    #[arg(short = 'n', long, default_value_t = 100)]
    calls: usize,

    /// Calls kept in flight at once
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Breaker name (taken from the config file when defined there)
    #[arg(long, default_value = "drill")]
    breaker: String,

    /// Retry preset, built-in or from the config file
    #[arg(long, default_value = "default", conflicts_with = "no_retry")]
    retry: String,

    /// Do not retry failed calls
    #[arg(long)]
    no_retry: bool,

    /// Timeout preset whose default deadline bounds each attempt
    #[arg(long, default_value = "fast", conflicts_with = "no_timeout")]
    timeout: String,

    /// Do not bound attempts with a deadline
    #[arg(long)]
    no_timeout: bool,

    /// Breaker placement relative to retries
    #[arg(long, value_enum, default_value = "outer")]
    placement: PlacementArg,

    /// Probability that a dependency call fails (0.0 - 1.0)
    #[arg(long, default_value_t = 0.2)]
    failure_rate: f64,

    /// Base latency of the dependency in milliseconds
    #[arg(long, default_value_t = 50)]
    latency_ms: u64,

    /// Random extra latency of up to this many milliseconds
    #[arg(long, default_value_t = 0)]
    jitter_ms: u64,

    /// Failure kind reported by the dependency
    #[arg(long, default_value = "transient")]
    failure_kind: String,

    /// Seed of the dependency's random draws
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PlacementArg {
    Outer,
    PerAttempt,
}

impl From<PlacementArg> for BreakerPlacement {
    fn from(arg: PlacementArg) -> Self {
        match arg {
            PlacementArg::Outer => BreakerPlacement::Outer,
            PlacementArg::PerAttempt => BreakerPlacement::PerAttempt,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            tracing::error!(category = %e.category(), error = %e, "Command failed");
            cli_style::print_error(&e.to_string(), hint_for(&e));
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn hint_for(error: &RampartError) -> Option<&'static str> {
    match error {
        RampartError::ConfigLoad { .. } => Some("Run `rampart init` to write a starter file"),
        RampartError::InvalidConfig(_) => Some("Run `rampart presets` to list known presets"),
        _ => None,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => RampartConfig::from_file(path)?,
        None => RampartConfig::default(),
    };

    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    if let Err(e) = logging::init_logging(&config) {
        cli_style::print_warning(&format!("Failed to initialize logging: {}", e));
    }

    match cli.command {
        Commands::Presets => show_presets(&config),
        Commands::Check => {
            let path = cli.config.ok_or_else(|| {
                RampartError::Config("`check` needs a file passed with --config".to_string())
            })?;
            check_config(&path, &config)
        }
        Commands::Init { path, force } => init_config(&path, force),
        Commands::Drill(args) => drill(&config, args),
    }
}

fn show_presets(config: &RampartConfig) -> Result<()> {
    let registry = config.build_registry()?;

    section_header("Retry Presets");
    let mut retry: Vec<(String, RetryConfig)> = RetryPreset::ALL
        .iter()
        .map(|preset| (preset.to_string(), RetryConfig::preset(*preset)))
        .collect();
    for name in registry.custom_retry_names() {
        retry.push((format!("{} (config)", name), registry.retry_config(&name)?));
    }
    println!("{}", retry_preset_table(&retry));

    section_header("Timeout Presets");
    let mut timeouts: Vec<(String, TimeoutConfig)> = TimeoutPreset::ALL
        .iter()
        .map(|preset| (preset.to_string(), TimeoutConfig::preset(*preset)))
        .collect();
    for name in registry.custom_timeout_names() {
        timeouts.push((format!("{} (config)", name), registry.timeout_config(&name)?));
    }
    println!("{}", timeout_preset_table(&timeouts));

    Ok(())
}

fn check_config(path: &std::path::Path, config: &RampartConfig) -> Result<()> {
    config.validate()?;
    let registry = config.build_registry()?;

    section_header("Breakers");
    if registry.breakers().is_empty() {
        print_info("No breakers configured");
    } else {
        println!("{}", breaker_table(&registry.breakers().snapshots()));
    }

    let retry: Vec<(String, RetryConfig)> = registry
        .custom_retry_names()
        .into_iter()
        .map(|name| registry.retry_config(&name).map(|c| (name, c)))
        .collect::<std::result::Result<_, _>>()?;
    if !retry.is_empty() {
        section_header("Retry Presets");
        println!("{}", retry_preset_table(&retry));
    }

    let timeouts: Vec<(String, TimeoutConfig)> = registry
        .custom_timeout_names()
        .into_iter()
        .map(|name| registry.timeout_config(&name).map(|c| (name, c)))
        .collect::<std::result::Result<_, _>>()?;
    if !timeouts.is_empty() {
        section_header("Timeout Presets");
        println!("{}", timeout_preset_table(&timeouts));
    }

    if let Some(budget) = registry.budget() {
        section_header("Retry Budget");
        println!("{}", budget_table(budget.config(), None));
    }

    println!();
    print_success(&format!("{} is valid", path.display()));
    Ok(())
}

fn init_config(path: &std::path::Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(RampartError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    RampartConfig::starter().to_file(path)?;
    print_success(&format!("Wrote {}", path.display()));
    Ok(())
}

fn drill(config: &RampartConfig, args: DrillArgs) -> Result<()> {
    let registry: ResilienceRegistry = config.build_registry()?;
    let options = DrillOptions {
        calls: args.calls,
        concurrency: args.concurrency,
        breaker: args.breaker,
        retry_preset: (!args.no_retry).then_some(args.retry),
        timeout_preset: (!args.no_timeout).then_some(args.timeout),
        placement: args.placement.into(),
        seed: args.seed,
    };
    let dependency = FlakyDependency::new(
        args.failure_rate,
        Duration::from_millis(args.latency_ms),
        options.seed,
    )
    .with_latency_jitter(Duration::from_millis(args.jitter_ms))
    .with_failure_kind(args.failure_kind);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(run_drill(&registry, &options, &dependency))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    section_header("Drill");
    println!(
        "{} {} calls against a dependency failing {:.0}% of the time",
        Theme::primary("→"),
        options.calls,
        dependency.failure_rate() * 100.0
    );
    println!("{}", drill_summary_table(&report));
    println!("{}", breaker_table(&[report.breaker.clone()]));

    if let (Some(budget), Some(stats)) = (registry.budget(), report.budget) {
        section_header("Retry Budget");
        println!("{}", budget_table(budget.config(), Some(stats)));
    }
    Ok(())
}
