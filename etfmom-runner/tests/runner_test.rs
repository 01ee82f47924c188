//! Integration tests for the runner: CSV directory in, artifacts out.
//!
//! Builds a small ETF universe as CSV files in a temp directory, loads a TOML
//! config from disk, and exercises single runs, export, and preset sweeps.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use etfmom_core::{AbortReason, CancellationToken, RunStatus};
use etfmom_runner::export::{export_artifact_json, import_artifact_json};
use etfmom_runner::{
    load_artifacts, load_config, load_presets, run_single, save_artifacts, DataSource,
    PresetSweep, RunnerError,
};

const CODES: [&str; 5] = ["510300", "510500", "159915", "518880", "513100"];

fn weekdays(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut d = from;
    while d <= to {
        if d.weekday().num_days_from_monday() < 5 {
            out.push(d);
        }
        d = d.succ_opt().unwrap();
    }
    out
}

fn write_fixture(dir: &Path) {
    let dates = weekdays(
        NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
        NaiveDate::from_ymd_opt(2023, 12, 29).unwrap(),
    );

    for (k, code) in CODES.iter().enumerate() {
        let drift = 1.0 + 0.0004 * (k as f64 - 1.5);
        let mut csv = String::from("date,close\n");
        for (i, d) in dates.iter().enumerate() {
            let wave = 1.0 + 0.03 * (i as f64 * 0.05 + k as f64).sin();
            let close = 2.0 * drift.powi(i as i32) * wave;
            writeln!(csv, "{d},{close:.4}").unwrap();
        }
        fs::write(dir.join(format!("{code}.csv")), csv).unwrap();
    }

    let mut csv = String::from("date,close,high,low\n");
    for (i, d) in dates.iter().enumerate() {
        let close = 3500.0 * 1.0003_f64.powi(i as i32);
        writeln!(csv, "{d},{close:.2},{:.2},{:.2}", close * 1.004, close * 0.996).unwrap();
    }
    fs::write(dir.join("000300.csv"), csv).unwrap();
}

fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
    let universe = CODES.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(", ");
    let text = format!(
        "universe = [{universe}]\nbenchmark = \"000300\"\n\
         start = \"2023-01-03\"\nend = \"2023-12-29\"\n{extra}"
    );
    let path = dir.join("run.toml");
    fs::write(&path, text).unwrap();
    path
}

// ─── Single run ─────────────────────────────────────────────────────

#[test]
fn csv_run_completes_end_to_end() {
    let data = tempfile::tempdir().unwrap();
    write_fixture(data.path());
    let config = load_config(&write_config(data.path(), "")).unwrap();

    let source = DataSource::CsvDir {
        dir: data.path().to_path_buf(),
    };
    let artifact = run_single(&config, &source).unwrap();
    let report = &artifact.report;

    assert!(report.status.is_completed());
    assert!(!artifact.has_synthetic());
    assert_eq!(report.run_id, config.run_id());
    assert!(!report.equity_curve.is_empty());
    assert!(report.rebalance_count > 0);
    assert!(report.trade_log.iter().any(|t| t.action.as_str() == "BUY"));
    for p in &report.equity_curve {
        assert!((p.cash_weight + p.satellite_weight - 1.0).abs() < 1e-9);
    }
}

#[test]
fn missing_asset_file_is_annotated_not_fatal() {
    let data = tempfile::tempdir().unwrap();
    write_fixture(data.path());
    fs::remove_file(data.path().join("513100.csv")).unwrap();
    let config = load_config(&write_config(data.path(), "")).unwrap();

    let source = DataSource::CsvDir {
        dir: data.path().to_path_buf(),
    };
    let report = run_single(&config, &source).unwrap().report;
    assert!(report.status.is_completed());
    assert!(report
        .data_annotations
        .iter()
        .any(|a| a.code() == Some("513100")));
    assert!(report.trade_log.iter().all(|t| t.code != "513100"));
}

#[test]
fn missing_benchmark_fails_the_run() {
    let data = tempfile::tempdir().unwrap();
    write_fixture(data.path());
    fs::remove_file(data.path().join("000300.csv")).unwrap();
    let config = load_config(&write_config(data.path(), "")).unwrap();

    let source = DataSource::CsvDir {
        dir: data.path().to_path_buf(),
    };
    assert!(matches!(run_single(&config, &source), Err(RunnerError::Run(_))));
}

// ─── Export ─────────────────────────────────────────────────────────

#[test]
fn artifacts_round_trip_through_disk() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_fixture(data.path());
    let config = load_config(&write_config(data.path(), "")).unwrap();
    let artifact = run_single(
        &config,
        &DataSource::CsvDir {
            dir: data.path().to_path_buf(),
        },
    )
    .unwrap();

    let run_dir = save_artifacts(&artifact, out.path()).unwrap();
    for file in ["run.json", "report.json", "trades.csv", "equity.csv"] {
        assert!(run_dir.join(file).exists(), "{file} missing");
    }

    let trades = fs::read_to_string(run_dir.join("trades.csv")).unwrap();
    assert_eq!(trades.lines().count(), artifact.report.trade_log.len() + 1);
    let equity = fs::read_to_string(run_dir.join("equity.csv")).unwrap();
    assert_eq!(equity.lines().count(), artifact.report.equity_curve.len() + 1);

    let loaded = load_artifacts(&run_dir).unwrap();
    assert_eq!(loaded.report.run_id, artifact.report.run_id);
    assert_eq!(loaded.report.status, artifact.report.status);
    assert_eq!(loaded.report.trade_log.len(), artifact.report.trade_log.len());
    assert_eq!(loaded.report.equity_curve.len(), artifact.report.equity_curve.len());
    let (a, b) = (
        loaded.report.final_equity().unwrap(),
        artifact.report.final_equity().unwrap(),
    );
    assert!((a - b).abs() < 1e-6);
    assert_eq!(loaded.dataset_hash, artifact.dataset_hash);
    assert_eq!(loaded.config.universe, artifact.config.universe);
}

#[test]
fn import_rejects_future_schema_version() {
    let artifact = run_single(
        &etfmom_core::BacktestConfig {
            universe: vec!["A".into(), "B".into(), "C".into()],
            benchmark: "IDX".into(),
            start: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(),
            ..Default::default()
        },
        &DataSource::Synthetic { seed: 9 },
    )
    .unwrap();

    let mut value: serde_json::Value =
        serde_json::from_str(&export_artifact_json(&artifact).unwrap()).unwrap();
    value["schema_version"] = serde_json::json!(99);
    let err = import_artifact_json(&value.to_string()).unwrap_err();
    assert!(err.to_string().contains("unsupported schema version"));
}

// ─── Sweep ──────────────────────────────────────────────────────────

fn write_presets(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("presets.toml");
    fs::write(
        &path,
        r#"
[[preset]]
name = "monthly"
rebalance = { type = "monthly" }

[[preset]]
name = "strict-floor"
selection = { min_percentile = 80.0 }

[[preset]]
name = "narrow"
universe = ["510300", "510500", "159915"]
"#,
    )
    .unwrap();
    path
}

#[test]
fn sweep_parallel_matches_sequential() {
    let data = tempfile::tempdir().unwrap();
    write_fixture(data.path());
    let base = load_config(&write_config(data.path(), "")).unwrap();
    let presets = load_presets(&write_presets(data.path())).unwrap();
    let source = DataSource::CsvDir {
        dir: data.path().to_path_buf(),
    };

    let cancel = CancellationToken::new();
    let parallel = PresetSweep::new(base.clone(), presets.clone())
        .run(&source, &cancel)
        .unwrap();
    let sequential = PresetSweep::new(base, presets)
        .with_parallelism(false)
        .run(&source, &cancel)
        .unwrap();

    assert_eq!(parallel.len(), 4);
    for (p, s) in parallel.all().iter().zip(sequential.all()) {
        assert_eq!(p.preset, s.preset);
        assert_eq!(p.report, s.report);
    }
    assert!(parallel.get("narrow").is_some());
    let narrow = &parallel.get("narrow").unwrap().report;
    assert!(narrow
        .trade_log
        .iter()
        .all(|t| ["510300", "510500", "159915"].contains(&t.code.as_str())));
    assert!(parallel.best().is_some());
}

#[test]
fn sweep_run_ids_differ_per_preset() {
    let data = tempfile::tempdir().unwrap();
    write_fixture(data.path());
    let base = load_config(&write_config(data.path(), "")).unwrap();
    let presets = load_presets(&write_presets(data.path())).unwrap();
    let results = PresetSweep::new(base, presets)
        .run(
            &DataSource::CsvDir {
                dir: data.path().to_path_buf(),
            },
            &CancellationToken::new(),
        )
        .unwrap();

    let mut ids: Vec<&str> = results.all().iter().map(|e| e.report.run_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), results.len());
}

#[test]
fn cancelled_sweep_aborts_every_run() {
    let data = tempfile::tempdir().unwrap();
    write_fixture(data.path());
    let base = load_config(&write_config(data.path(), "")).unwrap();
    let presets = load_presets(&write_presets(data.path())).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let results = PresetSweep::new(base, presets)
        .run(
            &DataSource::CsvDir {
                dir: data.path().to_path_buf(),
            },
            &cancel,
        )
        .unwrap();

    assert_eq!(results.completed().count(), 0);
    for entry in results.all() {
        assert!(matches!(
            entry.report.status,
            RunStatus::Aborted {
                reason: AbortReason::Cancelled,
                ..
            }
        ));
    }
    assert!(results.best().is_none());
}
