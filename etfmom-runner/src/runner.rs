//! Single-run entry points.
//!
//! - `run_single()`: builds the provider for a `DataSource`, loads, runs. Used by the CLI.
//! - `run_on_data()`: runs on preloaded `MarketData`. Used by the sweep.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use etfmom_core::{
    BacktestConfig, BacktestSimulator, CancellationToken, MarketData, PerformanceReport, RunError,
};

use crate::config::ConfigFileError;
use crate::data_loader::{dataset_hash, CsvDirectoryProvider, SyntheticProvider};

/// Errors from the runner layer.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    ConfigFile(#[from] ConfigFileError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("sweep configs use different benchmarks: '{0}' and '{1}'")]
    MixedBenchmarks(String, String),
}

/// Where prices come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    /// `<dir>/<CODE>.csv` for every asset and the benchmark.
    CsvDir { dir: PathBuf },
    /// Seeded random walks. Developer-only.
    Synthetic { seed: u64 },
}

impl DataSource {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, DataSource::Synthetic { .. })
    }

    /// Simulator wired to this source's provider for both prices and benchmark.
    pub fn simulator(&self) -> BacktestSimulator {
        match self {
            DataSource::CsvDir { dir } => {
                let provider = Arc::new(CsvDirectoryProvider::new(dir.clone()));
                BacktestSimulator::new(provider.clone(), provider)
            }
            DataSource::Synthetic { seed } => {
                let provider = Arc::new(SyntheticProvider::new(*seed));
                BacktestSimulator::new(provider.clone(), provider)
            }
        }
    }
}

/// Current schema version for persisted run artifacts.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// A finished run plus the provenance needed to reproduce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifact {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub config: BacktestConfig,
    pub source: DataSource,
    pub dataset_hash: String,
    pub report: PerformanceReport,
}

impl RunArtifact {
    pub fn has_synthetic(&self) -> bool {
        self.source.is_synthetic()
    }
}

/// Validate, load and run one config.
pub fn run_single(
    config: &BacktestConfig,
    source: &DataSource,
) -> Result<RunArtifact, RunnerError> {
    config.validate().map_err(RunError::from)?;
    if source.is_synthetic() {
        warn!("running on synthetic data; results are not meaningful");
    }

    let data = source.simulator().load(config)?;
    let hash = dataset_hash(&data);
    let report = run_on_data(config, &data, &CancellationToken::new())?;

    info!(
        run_id = %report.run_id,
        status = ?report.status,
        cumulative_return = report.cumulative_return,
        trades = report.trade_log.len(),
        "run finished"
    );

    Ok(RunArtifact {
        schema_version: SCHEMA_VERSION,
        config: config.clone(),
        source: source.clone(),
        dataset_hash: hash,
        report,
    })
}

/// Run on preloaded data. Load-time annotations for codes outside this
/// config's universe are dropped so shared data does not leak into reports.
pub fn run_on_data(
    config: &BacktestConfig,
    data: &MarketData,
    cancel: &CancellationToken,
) -> Result<PerformanceReport, RunError> {
    let scoped = MarketData {
        panel: Arc::clone(&data.panel),
        benchmark: Arc::clone(&data.benchmark),
        annotations: data
            .annotations
            .iter()
            .filter(|a| match a.code() {
                Some(code) => config.universe.iter().any(|c| c == code),
                None => true,
            })
            .cloned()
            .collect(),
    };
    BacktestSimulator::run_with_data(config.clone(), &scoped, cancel)
}
