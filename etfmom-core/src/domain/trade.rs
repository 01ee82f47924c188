//! Trade log entries emitted on every rebalance.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

/// Why a position was opened, closed, kept or resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradeReason {
    /// Admitted (or still admitted) by momentum selection; or dropped below the floor.
    Momentum,
    /// Dropped because a higher-ranked admitted asset is too correlated.
    Correlation,
    /// Kept through, or removed at the end of, the observation period.
    Rotation,
    /// Weight scaled down by the drawdown risk ceiling.
    RiskCap,
    /// Sold because the regime allows fewer legs than are held.
    RegimeCap,
    /// Sold because the loss since entry breached the stop.
    StopLoss,
}

impl TradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeReason::Momentum => "momentum",
            TradeReason::Correlation => "correlation",
            TradeReason::Rotation => "rotation",
            TradeReason::RiskCap => "risk-cap",
            TradeReason::RegimeCap => "regime-cap",
            TradeReason::StopLoss => "stop-loss",
        }
    }
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
            TradeAction::Hold => "HOLD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub date: NaiveDate,
    pub action: TradeAction,
    pub code: String,
    pub weight_before: f64,
    pub weight_after: f64,
    pub reason: TradeReason,
}
