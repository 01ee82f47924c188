//! Performance metrics - pure functions over the daily equity curve.
//!
//! No dependencies on the simulator or data layer. Annualization assumes
//! 252 sessions per year. Run-level figures are measured from the initial
//! capital, so costs paid on the first session count against the run.

use serde::{Deserialize, Serialize};

/// Sessions per year used for annualization.
pub const SESSIONS_PER_YEAR: f64 = 252.0;

/// Runs shorter than this report no annualized figures.
pub const MIN_ANNUALIZED_SESSIONS: usize = 180;

/// Headline figures of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub cumulative_return: f64,
    pub annualized_return: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub turnover: f64,
    pub trading_days: usize,
    pub sample_too_short: bool,
}

impl RunMetrics {
    /// `equity_curve` holds one end-of-session value per session;
    /// `total_turnover` is the sum of per-rebalance turnover.
    pub fn compute(
        initial_capital: f64,
        equity_curve: &[f64],
        total_turnover: f64,
        risk_free_rate: f64,
    ) -> Self {
        let trading_days = equity_curve.len();
        let sample_too_short = trading_days < MIN_ANNUALIZED_SESSIONS;

        // Opening capital followed by every session close.
        let series: Vec<f64> = std::iter::once(initial_capital)
            .chain(equity_curve.iter().copied())
            .collect();

        let (annualized_return, sharpe_ratio) = if sample_too_short {
            (None, None)
        } else {
            (
                Some(cagr(&series)),
                Some(sharpe_ratio(&series, risk_free_rate)),
            )
        };
        Self {
            cumulative_return: total_return(&series),
            annualized_return,
            sharpe_ratio,
            max_drawdown: max_drawdown(&series),
            turnover: total_turnover,
            trading_days,
            sample_too_short,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&final_eq)) if equity_curve.len() >= 2 && initial > 0.0 => {
            (final_eq - initial) / initial
        }
        _ => 0.0,
    }
}

/// Compound annual growth rate over the `len - 1` daily returns of the curve.
/// Returns 0.0 for single-point or broken curves.
pub fn cagr(equity_curve: &[f64]) -> f64 {
    let periods = equity_curve.len().saturating_sub(1);
    if periods == 0 {
        return 0.0;
    }
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if initial <= 0.0 || final_eq <= 0.0 {
        return 0.0;
    }
    let years = periods as f64 / SESSIONS_PER_YEAR;
    (final_eq / initial).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio from daily returns.
///
/// Sharpe = mean(daily returns - rf) / std(daily returns) * sqrt(252).
/// Returns 0.0 if variance is zero or fewer than 2 returns.
pub fn sharpe_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let returns = daily_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / SESSIONS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    (mean_f64(&excess) / std) * SESSIONS_PER_YEAR.sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn daily_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
