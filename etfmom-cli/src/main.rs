//! etfmom CLI - run, sweep and validate commands.
//!
//! Commands:
//! - `run` - execute one backtest from a TOML config file
//! - `sweep` - run the base config plus every `[[preset]]` override in parallel
//! - `validate` - parse and validate a config (and optional presets) without running

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use etfmom_core::{CancellationToken, PerformanceReport, RunStatus};
use etfmom_runner::{
    load_config, load_presets, run_single, save_artifacts, write_report_json, write_trade_log_csv,
    DataSource, PresetSweep, RunArtifact, SweepResults,
};

#[derive(Parser)]
#[command(name = "etfmom", about = "etfmom CLI - ETF momentum rotation backtester")]
struct Cli {
    /// Raise log verbosity to debug (overrides RUST_LOG).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Directory of `<CODE>.csv` price files (assets and benchmark).
    #[arg(long, conflicts_with = "synthetic")]
    data_dir: Option<PathBuf>,

    /// Use seeded synthetic prices instead of files.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Seed for synthetic prices.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl DataArgs {
    fn source(&self) -> Result<DataSource> {
        match (&self.data_dir, self.synthetic) {
            (Some(dir), false) => {
                if !dir.is_dir() {
                    bail!("data directory {} does not exist", dir.display());
                }
                Ok(DataSource::CsvDir { dir: dir.clone() })
            }
            (None, true) => Ok(DataSource::Synthetic { seed: self.seed }),
            _ => bail!("one of --data-dir or --synthetic is required"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        #[command(flatten)]
        data: DataArgs,

        /// Output directory for the artifact set.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Also write the report JSON to this path.
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Also write the trade log CSV to this path.
        #[arg(long)]
        trades_csv: Option<PathBuf>,
    },
    /// Run the base config and every preset in a presets file.
    Sweep {
        /// Path to the base TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Path to a TOML file with a `[[preset]]` array.
        #[arg(long)]
        presets: PathBuf,

        #[command(flatten)]
        data: DataArgs,

        /// Run presets one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Output directory; each preset's report is written as `<name>.json`.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Parse and validate a config file without running it.
    Validate {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Optional presets file to validate against the config.
        #[arg(long)]
        presets: Option<PathBuf>,

        /// Print the fully-defaulted config as JSON.
        #[arg(long, default_value_t = false)]
        print: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            data,
            output_dir,
            report_json,
            trades_csv,
        } => run_cmd(&config, &data, &output_dir, report_json.as_deref(), trades_csv.as_deref()),
        Commands::Sweep {
            config,
            presets,
            data,
            sequential,
            output_dir,
        } => sweep_cmd(&config, &presets, &data, sequential, output_dir.as_deref()),
        Commands::Validate {
            config,
            presets,
            print,
        } => validate_cmd(&config, presets.as_deref(), print),
    }
}

fn init_tracing(verbose: u8) {
    let filter = if verbose > 0 {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_cmd(
    config_path: &Path,
    data: &DataArgs,
    output_dir: &Path,
    report_json: Option<&Path>,
    trades_csv: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let source = data.source()?;

    let artifact = run_single(&config, &source)?;
    print_summary(&artifact);

    let run_dir = save_artifacts(&artifact, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    if let Some(path) = report_json {
        write_report_json(&artifact.report, path)?;
    }
    if let Some(path) = trades_csv {
        write_trade_log_csv(&artifact.report, path)?;
    }
    Ok(())
}

fn sweep_cmd(
    config_path: &Path,
    presets_path: &Path,
    data: &DataArgs,
    sequential: bool,
    output_dir: Option<&Path>,
) -> Result<()> {
    let base = load_config(config_path)?;
    let presets = load_presets(presets_path)?;
    let source = data.source()?;

    let results = PresetSweep::new(base, presets)
        .with_parallelism(!sequential)
        .run(&source, &CancellationToken::new())?;
    print_sweep(&results);

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        for entry in results.all() {
            write_report_json(&entry.report, &dir.join(format!("{}.json", entry.preset)))?;
        }
        println!("Reports saved to: {}", dir.display());
    }
    Ok(())
}

fn validate_cmd(config_path: &Path, presets_path: Option<&Path>, print: bool) -> Result<()> {
    let config = load_config(config_path)?;
    println!("{}: ok (run_id {})", config_path.display(), config.run_id());

    if let Some(path) = presets_path {
        for preset in load_presets(path)? {
            let merged = preset.apply(&config)?;
            println!("  preset {}: ok (run_id {})", preset.name, merged.run_id());
        }
    }
    if print {
        println!("{}", serde_json::to_string_pretty(&config)?);
    }
    Ok(())
}

fn pct(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn status_line(report: &PerformanceReport) -> String {
    match report.status {
        RunStatus::Aborted { date, reason } => format!("aborted on {date} ({reason:?})"),
        other => format!("{other:?}").to_lowercase(),
    }
}

fn print_summary(artifact: &RunArtifact) {
    let report = &artifact.report;
    let config = &artifact.config;

    println!();
    println!("=== Backtest Result ===");
    println!("Run ID:         {}", report.run_id);
    println!("Status:         {}", status_line(report));
    println!("Period:         {} to {}", config.start, config.end);
    println!("Universe:       {} assets, benchmark {}", config.universe.len(), config.benchmark);
    println!("Sessions:       {}", report.trading_days);
    println!("Rebalances:     {}", report.rebalance_count);
    println!("Trades:         {}", report.trade_log.len());
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {}", pct(Some(report.cumulative_return)));
    println!("Annualized:     {}", pct(report.annualized_return));
    match report.sharpe_ratio {
        Some(s) => println!("Sharpe:         {s:.3}"),
        None => println!("Sharpe:         n/a"),
    }
    println!("Max Drawdown:   {}", pct(Some(report.max_drawdown)));
    println!("Turnover:       {:.2}x", report.turnover);
    println!("Risk Events:    {}", report.risk_events.len());
    if report.sample_too_short {
        println!();
        println!("NOTE: fewer than 180 sessions; annualized figures omitted");
    }
    if artifact.has_synthetic() {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    for note in &report.data_annotations {
        println!("DATA: {}", serde_json::to_string(note).unwrap_or_default());
    }
}

fn print_sweep(results: &SweepResults) {
    println!();
    println!("=== Sweep ({} presets) ===", results.len());
    println!(
        "{:<20} {:>10} {:>10} {:>8} {:>10}  status",
        "preset", "return", "annual", "sharpe", "max dd"
    );
    for entry in results.all() {
        let r = &entry.report;
        println!(
            "{:<20} {:>10} {:>10} {:>8} {:>10}  {}",
            entry.preset,
            pct(Some(r.cumulative_return)),
            pct(r.annualized_return),
            r.sharpe_ratio.map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}")),
            pct(Some(r.max_drawdown)),
            status_line(r),
        );
    }
    if let Some(best) = results.best() {
        println!();
        println!("Best by Sharpe: {}", best.preset);
    }
}
