//! Preset sweeps: one base config, many named overrides, run in parallel.
//!
//! Data is loaded once for the union of every config's universe over the
//! widest requested range and shared behind `Arc`s. Each run owns its own
//! portfolio, rotation and risk state, so runs never contend. A shared
//! `CancellationToken` stops every in-flight run at its next rebalance date.

use rayon::prelude::*;
use tracing::info;

use etfmom_core::{BacktestConfig, CancellationToken, MarketData, PerformanceReport, RunError};

use crate::config::{ConfigFileError, Preset};
use crate::runner::{run_on_data, DataSource, RunnerError};

/// Name under which the unmodified base config runs.
pub const BASE_PRESET: &str = "base";

/// One finished preset run.
#[derive(Debug, Clone)]
pub struct SweepEntry {
    pub preset: String,
    pub config: BacktestConfig,
    pub report: PerformanceReport,
}

/// Sweep executor.
#[derive(Debug, Clone)]
pub struct PresetSweep {
    base: BacktestConfig,
    presets: Vec<Preset>,
    parallel: bool,
}

impl PresetSweep {
    pub fn new(base: BacktestConfig, presets: Vec<Preset>) -> Self {
        Self {
            base,
            presets,
            parallel: true,
        }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The base config followed by every preset applied onto it.
    pub fn configs(&self) -> Result<Vec<(String, BacktestConfig)>, ConfigFileError> {
        self.base.validate()?;
        let mut out = vec![(BASE_PRESET.to_string(), self.base.clone())];
        for preset in &self.presets {
            out.push((preset.name.clone(), preset.apply(&self.base)?));
        }
        Ok(out)
    }

    /// Load shared data from `source` and run every config.
    pub fn run(
        &self,
        source: &DataSource,
        cancel: &CancellationToken,
    ) -> Result<SweepResults, RunnerError> {
        let configs = self.configs()?;
        let shared = shared_load_config(&configs)?;
        let data = source.simulator().load(&shared)?;
        self.run_configs(configs, &data, cancel)
    }

    /// Run every config on preloaded data.
    pub fn run_on(
        &self,
        data: &MarketData,
        cancel: &CancellationToken,
    ) -> Result<SweepResults, RunnerError> {
        let configs = self.configs()?;
        self.run_configs(configs, data, cancel)
    }

    fn run_configs(
        &self,
        configs: Vec<(String, BacktestConfig)>,
        data: &MarketData,
        cancel: &CancellationToken,
    ) -> Result<SweepResults, RunnerError> {
        info!(presets = configs.len(), parallel = self.parallel, "sweep started");

        let run = |(preset, config): (String, BacktestConfig)| -> Result<SweepEntry, RunError> {
            let report = run_on_data(&config, data, cancel)?;
            Ok(SweepEntry {
                preset,
                config,
                report,
            })
        };
        let entries = if self.parallel {
            configs.into_par_iter().map(run).collect::<Result<Vec<_>, _>>()?
        } else {
            configs.into_iter().map(run).collect::<Result<Vec<_>, _>>()?
        };

        let results = SweepResults { entries };
        info!(
            completed = results.completed().count(),
            cancelled = results.len() - results.completed().count(),
            "sweep finished"
        );
        Ok(results)
    }
}

/// Config covering every run's data needs: union universe, earliest warmup
/// start, latest end. All configs must share one benchmark.
pub fn shared_load_config(
    configs: &[(String, BacktestConfig)],
) -> Result<BacktestConfig, RunnerError> {
    let Some((_, first)) = configs.first() else {
        return Err(ConfigFileError::Invalid(etfmom_core::ConfigError::EmptyUniverse).into());
    };

    let mut shared = first.clone();
    for (_, cfg) in &configs[1..] {
        if cfg.benchmark != shared.benchmark {
            return Err(RunnerError::MixedBenchmarks(
                shared.benchmark.clone(),
                cfg.benchmark.clone(),
            ));
        }
        for code in &cfg.universe {
            if !shared.universe.contains(code) {
                shared.universe.push(code.clone());
            }
        }
        shared.start = shared.start.min(cfg.start);
        shared.end = shared.end.max(cfg.end);
    }

    let earliest = configs
        .iter()
        .map(|(_, c)| c.data_start())
        .min()
        .unwrap_or(shared.start);
    shared.history_buffer_days = u32::try_from((shared.start - earliest).num_days()).unwrap_or(0);
    Ok(shared)
}

/// Results from a sweep, in config order (base first).
#[derive(Debug, Clone)]
pub struct SweepResults {
    entries: Vec<SweepEntry>,
}

impl SweepResults {
    pub fn all(&self) -> &[SweepEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, preset: &str) -> Option<&SweepEntry> {
        self.entries.iter().find(|e| e.preset == preset)
    }

    /// Entries that ran to the end date.
    pub fn completed(&self) -> impl Iterator<Item = &SweepEntry> {
        self.entries.iter().filter(|e| e.report.status.is_completed())
    }

    /// Completed entries ordered by Sharpe ratio (descending). Entries whose
    /// sample is too short for a Sharpe ratio sort by cumulative return after them.
    pub fn ranked(&self) -> Vec<&SweepEntry> {
        let mut ranked: Vec<&SweepEntry> = self.completed().collect();
        ranked.sort_by(|a, b| {
            let key = |e: &SweepEntry| {
                let sharpe = e.report.sharpe_ratio;
                (sharpe.is_some(), sharpe.unwrap_or(0.0))
            };
            let (ka, kb) = (key(a), key(b));
            kb.0.cmp(&ka.0)
                .then(kb.1.total_cmp(&ka.1))
                .then(b.report.cumulative_return.total_cmp(&a.report.cumulative_return))
        });
        ranked
    }

    pub fn best(&self) -> Option<&SweepEntry> {
        self.ranked().into_iter().next()
    }
}
