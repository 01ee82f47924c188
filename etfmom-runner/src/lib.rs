//! etfmom runner - config files, price providers, single runs, preset sweeps, export.
//!
//! This crate builds on `etfmom-core` to provide:
//! - TOML config loading and `[[preset]]` overrides
//! - CSV-directory and seeded synthetic price providers
//! - Single-run entry point with dataset fingerprinting
//! - Parallel preset sweeps over shared data with cancellation
//! - JSON / CSV export of reports and trade logs

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;
pub mod sweep;

pub use config::{load_config, load_presets, parse_config, parse_presets, ConfigFileError, Preset};
pub use data_loader::{dataset_hash, CsvDirectoryProvider, SyntheticProvider};
pub use export::{
    export_equity_csv, export_trade_log_csv, load_artifacts, save_artifacts, write_report_json,
    write_trade_log_csv,
};
pub use runner::{run_on_data, run_single, DataSource, RunArtifact, RunnerError, SCHEMA_VERSION};
pub use sweep::{PresetSweep, SweepEntry, SweepResults};
