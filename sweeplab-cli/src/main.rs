//! SweepLab CLI: run, count, analyze and template commands.
//!
//! Commands:
//! - `run` executes a parameter sweep from a TOML config file
//! - `count` reports the size of the sweep without running it
//! - `analyze` writes cross-symbol ranking reports from stored results
//! - `template` prints a parameter file for a registered strategy

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sweeplab_core::signals::StrategyRegistry;
use sweeplab_runner::{
    result_store, write_reports, ProgressBoard, SweepConfig, SweepPlan, SweepReport, SweepSession,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sweeplab",
    about = "SweepLab CLI: resumable parameter sweeps over many symbols"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every pending combination for every configured symbol.
    Run {
        /// Path to the sweep config.
        #[arg(long, default_value = "config/sweep.toml")]
        config: PathBuf,

        /// Generate random-walk prices instead of reading data files.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Worker threads; overrides `processor.workers`.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print combination count, grid size and rows per symbol.
    Count {
        #[arg(long, default_value = "config/sweep.toml")]
        config: PathBuf,
    },
    /// Write ranking reports into the result directory.
    Analyze {
        #[arg(long, default_value = "config/sweep.toml")]
        config: PathBuf,

        /// Rows per symbol report.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Print a parameter-file template for a strategy.
    Template {
        /// Registered strategy name, e.g. rsi_trend.
        #[arg(long)]
        strategy: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            synthetic,
            workers,
        } => run_sweep(&config, synthetic, workers),
        Commands::Count { config } => run_count(&config),
        Commands::Analyze { config, top } => run_analyze(&config, top),
        Commands::Template { strategy } => run_template(&strategy),
    }
}

fn load_config(path: &Path) -> Result<SweepConfig> {
    SweepConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))
}

fn load_plan(config: &SweepConfig) -> Result<SweepPlan> {
    let params = config
        .load_params()
        .with_context(|| format!("loading parameters for '{}'", config.strategy.name))?;
    Ok(SweepPlan::from_config(config, params)?)
}

fn run_sweep(config_path: &Path, synthetic: bool, workers: Option<usize>) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = StrategyRegistry::builtin();
    let mut session = SweepSession::prepare(&config, &registry, synthetic)?;
    if let Some(n) = workers {
        if n == 0 {
            bail!("--workers must be at least 1");
        }
        session = session.with_workers(n);
    }

    let report = session.run(Duration::from_millis(500), print_progress)?;
    eprintln!();
    print_report(&report);

    if !report.failed_workers.is_empty() {
        bail!("{} worker(s) did not finish", report.failed_workers.len());
    }
    Ok(())
}

/// One stderr line, rewritten in place.
fn print_progress(board: &ProgressBoard) {
    let parts: Vec<String> = board
        .iter()
        .map(|(worker, r)| {
            format!(
                "w{worker} {} {:>5.1}% [{}/{}]",
                r.label,
                r.fraction * 100.0,
                r.completed,
                r.total
            )
        })
        .collect();
    let mut err = std::io::stderr().lock();
    let _ = write!(err, "\r\x1b[2K{}", parts.join(" | "));
    let _ = err.flush();
}

fn print_report(report: &SweepReport) {
    println!("{:<14} {:>10} {:>10} {:>8} {:>8}", "Symbol", "Resumed", "Written", "Batches", "Failed");
    println!("{}", "-".repeat(54));
    for s in &report.symbols {
        println!(
            "{:<14} {:>10} {:>10} {:>8} {:>8}",
            s.symbol, s.already_done, s.rows_written, s.batches_ok, s.batches_failed
        );
    }
    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.join(", "));
    }
    println!(
        "Total rows written: {}, failed batches: {}",
        report.rows_written(),
        report.batches_failed()
    );
}

fn run_count(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let plan = load_plan(&config)?;

    println!("Strategy:        {}", plan.strategy);
    println!("Parameters:      {}", plan.expanded.names().join(", "));
    println!("Combinations:    {}", plan.total_combinations());
    println!("TP/SL pairs:     {}", plan.grid.len());
    println!("Rows per symbol: {}", plan.rows_per_symbol());
    Ok(())
}

fn run_analyze(config_path: &Path, top: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let plan = load_plan(&config)?;
    let store = result_store(&config, &plan.expanded);
    if !store.dir().exists() {
        bail!("no results at {}", store.dir().display());
    }

    let summary = write_reports(&store, top)?;
    info!(dir = %summary.dir.display(), "reports written");
    println!("Analyzed {} symbol(s)", summary.symbols);
    for file in &summary.files {
        println!("  {}", file.display());
    }
    Ok(())
}

fn run_template(strategy: &str) -> Result<()> {
    let registry = StrategyRegistry::builtin();
    let Some(generator) = registry.get(strategy) else {
        bail!(
            "unknown strategy '{strategy}' (available: {})",
            registry.names().join(", ")
        );
    };
    print!("{}", generator.defaults().to_toml_string());
    Ok(())
}
