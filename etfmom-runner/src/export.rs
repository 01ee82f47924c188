//! Report export: JSON for the full report, CSV for the trade log and equity curve.
//!
//! Persisted run artifacts carry a `schema_version`; unknown versions are
//! rejected on load. No formatting or colour is applied to any output.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use etfmom_core::domain::TradeLogEntry;
use etfmom_core::report::EquityPoint;
use etfmom_core::PerformanceReport;

use crate::runner::{RunArtifact, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Write the full report as pretty JSON.
pub fn write_report_json(report: &PerformanceReport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("failed to write report to {}", path.display()))
}

/// Serialize a run artifact to pretty JSON.
pub fn export_artifact_json(artifact: &RunArtifact) -> Result<String> {
    serde_json::to_string_pretty(artifact).context("failed to serialize RunArtifact to JSON")
}

/// Deserialize a run artifact, rejecting unknown schema versions.
pub fn import_artifact_json(json: &str) -> Result<RunArtifact> {
    let artifact: RunArtifact =
        serde_json::from_str(json).context("failed to deserialize RunArtifact from JSON")?;
    if artifact.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            artifact.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(artifact)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: date, action, code, weight_before, weight_after, reason
pub fn export_trade_log_csv(trades: &[TradeLogEntry]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "action", "code", "weight_before", "weight_after", "reason"])?;
    for t in trades {
        wtr.write_record([
            t.date.to_string(),
            t.action.as_str().to_string(),
            t.code.clone(),
            format!("{:.6}", t.weight_before),
            format!("{:.6}", t.weight_after),
            t.reason.as_str().to_string(),
        ])?;
    }
    into_string(wtr)
}

/// Columns: date, equity, cash_weight, satellite_weight, risk_level
pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "equity", "cash_weight", "satellite_weight", "risk_level"])?;
    for p in curve {
        wtr.write_record([
            p.date.to_string(),
            format!("{:.2}", p.equity),
            format!("{:.6}", p.cash_weight),
            format!("{:.6}", p.satellite_weight),
            p.risk_level.0.to_string(),
        ])?;
    }
    into_string(wtr)
}

fn into_string(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Write the report's trade log to `path`.
pub fn write_trade_log_csv(report: &PerformanceReport, path: &Path) -> Result<()> {
    let csv = export_trade_log_csv(&report.trade_log)?;
    fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))
}

// ─── Artifact directory ─────────────────────────────────────────────

/// Write `run.json`, `report.json`, `trades.csv` and `equity.csv` under
/// `<output_dir>/<run_id prefix>/`. Returns the run directory.
pub fn save_artifacts(artifact: &RunArtifact, output_dir: &Path) -> Result<PathBuf> {
    let id = &artifact.report.run_id;
    let dir = output_dir.join(&id[..id.len().min(16)]);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    fs::write(dir.join("run.json"), export_artifact_json(artifact)?)
        .with_context(|| format!("failed to write run.json in {}", dir.display()))?;
    write_report_json(&artifact.report, &dir.join("report.json"))?;
    write_trade_log_csv(&artifact.report, &dir.join("trades.csv"))?;
    fs::write(dir.join("equity.csv"), export_equity_csv(&artifact.report.equity_curve)?)
        .with_context(|| format!("failed to write equity.csv in {}", dir.display()))?;

    Ok(dir)
}

/// Load a run artifact back from a directory written by `save_artifacts`.
pub fn load_artifacts(dir: &Path) -> Result<RunArtifact> {
    let path = dir.join("run.json");
    let json = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_artifact_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use etfmom_core::components::RiskLevel;
    use etfmom_core::domain::{TradeAction, TradeReason};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn trade_log_csv_uses_wire_names() {
        let trades = vec![
            TradeLogEntry {
                date: d(4),
                action: TradeAction::Buy,
                code: "510300".into(),
                weight_before: 0.0,
                weight_after: 0.2,
                reason: TradeReason::Momentum,
            },
            TradeLogEntry {
                date: d(11),
                action: TradeAction::Sell,
                code: "510300".into(),
                weight_before: 0.21,
                weight_after: 0.0,
                reason: TradeReason::StopLoss,
            },
        ];
        let csv = export_trade_log_csv(&trades).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,action,code,weight_before,weight_after,reason");
        assert_eq!(lines[1], "2024-03-04,BUY,510300,0.000000,0.200000,momentum");
        assert_eq!(lines[2], "2024-03-11,SELL,510300,0.210000,0.000000,stop-loss");
    }

    #[test]
    fn empty_trade_log_has_header_only() {
        let csv = export_trade_log_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn equity_csv_rows() {
        let curve = vec![EquityPoint {
            date: d(4),
            equity: 100_000.0,
            cash_weight: 0.8,
            satellite_weight: 0.2,
            risk_level: RiskLevel(1),
        }];
        let csv = export_equity_csv(&curve).unwrap();
        assert!(csv.contains("2024-03-04,100000.00,0.800000,0.200000,1"));
    }
}
