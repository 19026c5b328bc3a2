//! n2r-diff CLI.
//!
//! `n2r-diff` with no subcommand is `n2r-diff run`: the count comes from
//! piped stdin or the configured default.
//!
//! Exit status: 0 for a clean run, 1 when any case mismatched, 2 when the
//! run could not be set up.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use n2r_diff::config::HarnessConfig;
use n2r_diff::input::read_count;
use n2r_diff::{
    conversion_handler, distribution_function, AdapterPair, FixedSamples, Orchestrator,
    RunOptions, RunReport, SampleGenerator, TracingLogger,
};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "n2r-diff")]
#[command(about = "Differential testing of N2R conversion routines", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare reference and target over generated samples (default)
    Run(RunArgs),

    /// Re-run explicit input values through the configured adapters
    Replay {
        /// Input value to replay (repeatable)
        #[arg(long = "value", required = true, allow_negative_numbers = true)]
        values: Vec<f64>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the effective configuration as TOML
    ShowConfig,

    /// Show version information
    Version,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Number of cases; read from stdin or defaulted when omitted
    #[arg(allow_negative_numbers = true)]
    count: Option<i64>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args, Default)]
struct Overrides {
    /// Comparison threads
    #[arg(long)]
    workers: Option<usize>,

    /// Per-call timeout for the target engine, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(workers) = self.workers {
            config.run.workers = workers;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.run.timeout_ms = Some(timeout_ms);
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(false)
        .with_ansi(io::stdout().is_terminal())
        .init();

    let cli = Cli::parse();
    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(2)
        }
    }
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config = HarnessConfig::load_or_default(cli.config.as_deref())?;

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            if let Some(seed) = args.seed {
                config.distribution.seed = Some(seed);
            }
            args.overrides.apply(&mut config);
            config.validate()?;

            let count = resolve_count(args.count, config.run.default_count)?;
            let adapters = conversion_handler(&config)?;
            let generator = distribution_function(&config)?;
            run_comparison(&config, count, &adapters, &generator, args.overrides.report.as_deref())
        }
        Commands::Replay { values, overrides } => {
            overrides.apply(&mut config);
            config.validate()?;

            let count = i64::try_from(values.len()).context("too many replay values")?;
            let adapters = conversion_handler(&config)?;
            let generator = FixedSamples::new(values);
            run_comparison(&config, count, &adapters, &generator, overrides.report.as_deref())
        }
        Commands::ShowConfig => {
            let rendered = config.to_toml().context("failed to render configuration")?;
            print!("{}", rendered);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => {
            println!("n2r-diff v{}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// CLI argument, then a line from piped stdin, then the configured default.
fn resolve_count(arg: Option<i64>, default: i64) -> Result<i64> {
    if let Some(count) = arg {
        return Ok(count);
    }
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(default);
    }
    Ok(read_count(stdin.lock(), default)?)
}

fn run_comparison(
    config: &HarnessConfig,
    count: i64,
    adapters: &AdapterPair,
    generator: &dyn SampleGenerator,
    report: Option<&Path>,
) -> Result<ExitCode> {
    let mut orchestrator = Orchestrator::new(RunOptions {
        tolerance: config.tolerance,
        workers: config.run.workers,
    });
    let summary = orchestrator.run(count, &TracingLogger, adapters, generator)?;

    if let Some(path) = report {
        RunReport::new(generator.seed(), &config.tolerance, adapters, &summary)
            .save(path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }

    Ok(if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
