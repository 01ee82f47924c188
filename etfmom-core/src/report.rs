//! Run output: status, equity curve, trade log, and the audit trail.
//!
//! Every degraded or skipped date is recorded here, so the portfolio's
//! behaviour on any session can be reconstructed after the fact.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::components::{
    CounterTransition, RegimeState, RiskEvent, RiskLevel, ScoreExclusion, Selection,
};
use crate::domain::{SeriesFault, TradeLogEntry};
use crate::metrics::RunMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    BenchmarkCorrupt { fault: SeriesFault },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Initialized,
    Running,
    Completed,
    Aborted { date: NaiveDate, reason: AbortReason },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash_weight: f64,
    pub satellite_weight: f64,
    pub risk_level: RiskLevel,
}

/// Data-quality notes collected while loading and simulating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataAnnotation {
    /// The provider had no history for this asset; it was dropped from the run.
    AssetUnavailable { code: String },
    /// First date on which an asset could not be scored for lack of history.
    InsufficientHistory {
        code: String,
        date: NaiveDate,
        required: usize,
        available: usize,
    },
    /// A held asset had no print; its last close was carried forward.
    StalePrice {
        code: String,
        date: NaiveDate,
        carried_from: NaiveDate,
    },
    /// Benchmark sessions inside the run that reused an earlier close.
    BenchmarkCarriedForward { sessions: usize },
    /// The benchmark series is unusable from `date` onward.
    BenchmarkFault { date: NaiveDate, fault: SeriesFault },
}

impl DataAnnotation {
    /// Asset the note is about; `None` for benchmark notes.
    pub fn code(&self) -> Option<&str> {
        match self {
            DataAnnotation::AssetUnavailable { code }
            | DataAnnotation::InsufficientHistory { code, .. }
            | DataAnnotation::StalePrice { code, .. } => Some(code),
            DataAnnotation::BenchmarkCarriedForward { .. }
            | DataAnnotation::BenchmarkFault { .. } => None,
        }
    }
}

/// Everything decided on one rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceDiagnostics {
    pub date: NaiveDate,
    pub regime: RegimeState,
    pub selection: Selection,
    pub excluded: Vec<(String, ScoreExclusion)>,
    pub stopped_out: Vec<String>,
    pub rotation: Vec<CounterTransition>,
    pub risk_level: RiskLevel,
    /// Multiplier applied to every leg by the drawdown ceiling.
    pub risk_scale: f64,
    pub turnover: f64,
    pub cost: f64,
    /// No trades were made (degenerate cross-section).
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub status: RunStatus,
    pub run_id: String,
    pub equity_curve: Vec<EquityPoint>,
    pub trade_log: Vec<TradeLogEntry>,
    pub cumulative_return: f64,
    pub annualized_return: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub turnover: f64,
    pub risk_events: Vec<RiskEvent>,
    pub selection_diagnostics: Vec<RebalanceDiagnostics>,
    pub data_annotations: Vec<DataAnnotation>,
    pub trading_days: usize,
    pub rebalance_count: usize,
    pub sample_too_short: bool,
}

impl PerformanceReport {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        status: RunStatus,
        run_id: String,
        equity_curve: Vec<EquityPoint>,
        trade_log: Vec<TradeLogEntry>,
        risk_events: Vec<RiskEvent>,
        selection_diagnostics: Vec<RebalanceDiagnostics>,
        data_annotations: Vec<DataAnnotation>,
        initial_capital: f64,
        risk_free_rate: f64,
    ) -> Self {
        let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
        let total_turnover = selection_diagnostics.iter().map(|d| d.turnover).sum();
        let m = RunMetrics::compute(initial_capital, &equity, total_turnover, risk_free_rate);
        Self {
            status,
            run_id,
            rebalance_count: selection_diagnostics.len(),
            equity_curve,
            trade_log,
            cumulative_return: m.cumulative_return,
            annualized_return: m.annualized_return,
            sharpe_ratio: m.sharpe_ratio,
            max_drawdown: m.max_drawdown,
            turnover: m.turnover,
            risk_events,
            selection_diagnostics,
            data_annotations,
            trading_days: m.trading_days,
            sample_too_short: m.sample_too_short,
        }
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }

    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }
}
