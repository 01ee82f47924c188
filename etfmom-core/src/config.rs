//! Immutable run configuration.
//!
//! A `BacktestConfig` is validated once before any date is processed and then
//! passed by value into the run context. Every section has defaults so a
//! minimal TOML file only needs the universe, benchmark and date range.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Configuration validation errors. Raised before the date loop starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("universe is empty")]
    EmptyUniverse,
    #[error("asset '{0}' appears more than once in the universe")]
    DuplicateAsset(String),
    #[error("benchmark code is empty")]
    EmptyBenchmark,
    #[error("start date {start} must be before end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("initial capital must be positive and finite, got {0}")]
    InvalidCapital(f64),
    #[error("at least one momentum window is required")]
    NoMomentumWindows,
    #[error("momentum window {sessions} sessions with weight {weight} is invalid")]
    InvalidMomentumWindow { sessions: usize, weight: f64 },
    #[error("momentum window weights must not sum to zero")]
    ZeroMomentumWeight,
    #[error("min_percentile must be within [0, 100], got {0}")]
    PercentileOutOfRange(f64),
    #[error("max_correlation must be within [-1, 1], got {0}")]
    CorrelationOutOfRange(f64),
    #[error("correlation window must be at least 2 sessions, got {0}")]
    CorrelationWindowTooShort(usize),
    #[error("max_legs for the {regime} regime must be >= 1, got {legs}")]
    InvalidMaxLegs { regime: &'static str, legs: usize },
    #[error("{regime} regime: {legs} legs at {exposure} exceeds full exposure or is not positive")]
    InvalidLegExposure {
        regime: &'static str,
        legs: usize,
        exposure: f64,
    },
    #[error("regime parameter '{name}' is invalid: {value}")]
    InvalidRegimeParameter { name: &'static str, value: f64 },
    #[error("cost rate '{name}' must be within [0, 1), got {value}")]
    InvalidCostRate { name: &'static str, value: f64 },
    #[error("stop-loss '{name}' must be within (0, 1], got {value}")]
    InvalidStopLoss { name: &'static str, value: f64 },
    #[error("risk rung (drawdown {drawdown}, ceiling {ceiling}) is invalid")]
    InvalidRiskRung { drawdown: f64, ceiling: f64 },
    #[error("risk ladder ceilings must not increase as drawdown deepens")]
    RiskLadderNotMonotonic,
    #[error("rebalance interval must be at least 1 session")]
    InvalidRebalanceInterval,
}

/// When the satellite sleeve is rebalanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RebalanceFrequency {
    /// First session of every ISO week.
    Weekly,
    /// First session of every calendar month.
    Monthly,
    /// Every `sessions` sessions, counted from the first run session.
    EverySessions { sessions: usize },
}

impl Default for RebalanceFrequency {
    fn default() -> Self {
        RebalanceFrequency::Weekly
    }
}

/// One lookback leg of the blended momentum score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumWindow {
    pub sessions: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub windows: Vec<MomentumWindow>,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            windows: vec![
                MomentumWindow {
                    sessions: 60,
                    weight: 0.6,
                },
                MomentumWindow {
                    sessions: 120,
                    weight: 0.4,
                },
            ],
        }
    }
}

impl MomentumConfig {
    pub fn max_window(&self) -> usize {
        self.windows.iter().map(|w| w.sessions).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Hard momentum floor, percentile in [0, 100].
    pub min_percentile: f64,
    /// Soft pairwise correlation ceiling among admitted legs.
    pub max_correlation: f64,
    /// Trailing sessions of log returns used for correlation.
    pub correlation_window: usize,
    /// Pairs with fewer overlapping returns have unknown correlation.
    pub min_correlation_observations: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_percentile: 60.0,
            max_correlation: 0.85,
            correlation_window: 90,
            min_correlation_observations: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub ma_period: usize,
    pub atr_period: usize,

    // Trend gate
    pub confirm_sessions: usize,
    pub unlock_band: f64,
    pub grace_sessions: usize,
    pub fallback_band: f64,

    // Chop gate
    pub band_window: usize,
    pub band_width: f64,
    pub band_min_hits: usize,
    pub atr_ratio_threshold: f64,
    pub slope_sessions: usize,
    pub slope_threshold: f64,
    pub top3_spread: f64,
    pub top5_spread: f64,
    pub min_chop_votes: usize,

    // Output mapping
    pub trend_legs: usize,
    pub trend_leg_exposure: f64,
    pub chop_legs: usize,
    pub chop_leg_exposure: f64,
    pub defensive_legs: usize,
    pub defensive_leg_exposure: f64,
    pub chop_min_hold_multiplier: usize,
    pub chop_stop_loss: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            ma_period: 200,
            atr_period: 20,
            confirm_sessions: 5,
            unlock_band: 0.01,
            grace_sessions: 3,
            fallback_band: 0.01,
            band_window: 30,
            band_width: 0.03,
            band_min_hits: 10,
            atr_ratio_threshold: 0.035,
            slope_sessions: 5,
            slope_threshold: 0.005,
            top3_spread: 0.03,
            top5_spread: 0.08,
            min_chop_votes: 2,
            trend_legs: 2,
            trend_leg_exposure: 0.20,
            chop_legs: 1,
            chop_leg_exposure: 0.15,
            defensive_legs: 1,
            defensive_leg_exposure: 0.15,
            chop_min_hold_multiplier: 2,
            chop_stop_loss: 0.08,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Consecutive unselected rebalances before a holding is rotated out.
    /// Zero means instant replacement.
    pub observation_period: u32,
    /// Sessions a new leg is protected from rotation removal.
    pub min_holding_sessions: usize,
    /// Loss since entry that forces an exit at the next rebalance.
    pub stop_loss: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            observation_period: 2,
            min_holding_sessions: 5,
            stop_loss: 0.12,
        }
    }
}

/// One step of the drawdown ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskRung {
    /// Trigger: drawdown at or below this (negative) fraction.
    pub drawdown: f64,
    /// Satellite exposure ceiling while the rung is active.
    pub ceiling: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub ladder: Vec<RiskRung>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            ladder: vec![
                RiskRung {
                    drawdown: -0.15,
                    ceiling: 0.40,
                },
                RiskRung {
                    drawdown: -0.20,
                    ceiling: 0.25,
                },
                RiskRung {
                    drawdown: -0.30,
                    ceiling: 0.10,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub commission_rate: f64,
    pub slippage_rate: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            commission_rate: 0.0003,
            slippage_rate: 0.0005,
        }
    }
}

impl CostConfig {
    pub fn total_rate(&self) -> f64 {
        self.commission_rate + self.slippage_rate
    }
}

/// Serializable configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub universe: Vec<String>,
    pub benchmark: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Calendar days of history requested before `start` for indicator warmup.
    pub history_buffer_days: u32,
    pub initial_capital: f64,
    /// Annual risk-free rate used for the Sharpe ratio.
    pub risk_free_rate: f64,
    pub rebalance: RebalanceFrequency,
    pub momentum: MomentumConfig,
    pub selection: SelectionConfig,
    pub regime: RegimeConfig,
    pub rotation: RotationConfig,
    pub risk: RiskConfig,
    pub costs: CostConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            universe: Vec::new(),
            benchmark: String::new(),
            start: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            history_buffer_days: 400,
            initial_capital: 100_000.0,
            risk_free_rate: 0.0,
            rebalance: RebalanceFrequency::default(),
            momentum: MomentumConfig::default(),
            selection: SelectionConfig::default(),
            regime: RegimeConfig::default(),
            rotation: RotationConfig::default(),
            risk: RiskConfig::default(),
            costs: CostConfig::default(),
        }
    }
}

impl BacktestConfig {
    /// Deterministic BLAKE3 fingerprint of the serialized configuration.
    ///
    /// Two runs with identical configs share the same id.
    pub fn run_id(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }

    /// Start of the data range to request from providers.
    pub fn data_start(&self) -> NaiveDate {
        self.start - chrono::Duration::days(i64::from(self.history_buffer_days))
    }

    /// Check every field. Called at load time and again at run initialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.universe.is_empty() {
            return Err(ConfigError::EmptyUniverse);
        }
        let mut seen = BTreeSet::new();
        for code in &self.universe {
            if !seen.insert(code.as_str()) {
                return Err(ConfigError::DuplicateAsset(code.clone()));
            }
        }
        if self.benchmark.trim().is_empty() {
            return Err(ConfigError::EmptyBenchmark);
        }
        if self.start >= self.end {
            return Err(ConfigError::InvalidDateRange {
                start: self.start,
                end: self.end,
            });
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::InvalidCapital(self.initial_capital));
        }
        if let RebalanceFrequency::EverySessions { sessions: 0 } = self.rebalance {
            return Err(ConfigError::InvalidRebalanceInterval);
        }

        self.validate_momentum()?;
        self.validate_selection()?;
        self.validate_regime()?;
        self.validate_rotation()?;
        self.validate_risk()?;
        self.validate_costs()
    }

    fn validate_momentum(&self) -> Result<(), ConfigError> {
        let windows = &self.momentum.windows;
        if windows.is_empty() {
            return Err(ConfigError::NoMomentumWindows);
        }
        for w in windows {
            if w.sessions == 0 || !w.weight.is_finite() {
                return Err(ConfigError::InvalidMomentumWindow {
                    sessions: w.sessions,
                    weight: w.weight,
                });
            }
        }
        if windows.iter().map(|w| w.weight).sum::<f64>().abs() < 1e-12 {
            return Err(ConfigError::ZeroMomentumWeight);
        }
        Ok(())
    }

    fn validate_selection(&self) -> Result<(), ConfigError> {
        let s = &self.selection;
        if !(0.0..=100.0).contains(&s.min_percentile) {
            return Err(ConfigError::PercentileOutOfRange(s.min_percentile));
        }
        if !(-1.0..=1.0).contains(&s.max_correlation) {
            return Err(ConfigError::CorrelationOutOfRange(s.max_correlation));
        }
        if s.correlation_window < 2 {
            return Err(ConfigError::CorrelationWindowTooShort(s.correlation_window));
        }
        Ok(())
    }

    fn validate_regime(&self) -> Result<(), ConfigError> {
        let r = &self.regime;
        for (regime, legs, exposure) in [
            ("trend", r.trend_legs, r.trend_leg_exposure),
            ("chop", r.chop_legs, r.chop_leg_exposure),
            ("defensive", r.defensive_legs, r.defensive_leg_exposure),
        ] {
            if legs < 1 {
                return Err(ConfigError::InvalidMaxLegs { regime, legs });
            }
            if !(exposure > 0.0 && exposure * legs as f64 <= 1.0 + 1e-9) {
                return Err(ConfigError::InvalidLegExposure {
                    regime,
                    legs,
                    exposure,
                });
            }
        }

        let periods = [
            ("ma_period", r.ma_period),
            ("atr_period", r.atr_period),
            ("confirm_sessions", r.confirm_sessions),
            ("grace_sessions", r.grace_sessions),
            ("band_window", r.band_window),
            ("slope_sessions", r.slope_sessions),
            ("chop_min_hold_multiplier", r.chop_min_hold_multiplier),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(ConfigError::InvalidRegimeParameter {
                    name,
                    value: value as f64,
                });
            }
        }
        if r.band_min_hits > r.band_window {
            return Err(ConfigError::InvalidRegimeParameter {
                name: "band_min_hits",
                value: r.band_min_hits as f64,
            });
        }
        if r.min_chop_votes == 0 || r.min_chop_votes > 3 {
            return Err(ConfigError::InvalidRegimeParameter {
                name: "min_chop_votes",
                value: r.min_chop_votes as f64,
            });
        }

        let fractions = [
            ("unlock_band", r.unlock_band),
            ("fallback_band", r.fallback_band),
            ("band_width", r.band_width),
            ("atr_ratio_threshold", r.atr_ratio_threshold),
            ("slope_threshold", r.slope_threshold),
            ("top3_spread", r.top3_spread),
            ("top5_spread", r.top5_spread),
        ];
        for (name, value) in fractions {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidRegimeParameter { name, value });
            }
        }
        if !(r.chop_stop_loss > 0.0 && r.chop_stop_loss <= 1.0) {
            return Err(ConfigError::InvalidStopLoss {
                name: "chop_stop_loss",
                value: r.chop_stop_loss,
            });
        }
        Ok(())
    }

    fn validate_rotation(&self) -> Result<(), ConfigError> {
        let stop = self.rotation.stop_loss;
        if !(stop > 0.0 && stop <= 1.0) {
            return Err(ConfigError::InvalidStopLoss {
                name: "stop_loss",
                value: stop,
            });
        }
        Ok(())
    }

    fn validate_risk(&self) -> Result<(), ConfigError> {
        let mut rungs = self.risk.ladder.clone();
        for rung in &rungs {
            let drawdown_ok =
                rung.drawdown.is_finite() && rung.drawdown < 0.0 && rung.drawdown > -1.0;
            let ceiling_ok = (0.0..=1.0).contains(&rung.ceiling);
            if !drawdown_ok || !ceiling_ok {
                return Err(ConfigError::InvalidRiskRung {
                    drawdown: rung.drawdown,
                    ceiling: rung.ceiling,
                });
            }
        }
        // Least severe first.
        rungs.sort_by(|a, b| b.drawdown.total_cmp(&a.drawdown));
        for pair in rungs.windows(2) {
            if pair[0].drawdown == pair[1].drawdown || pair[1].ceiling > pair[0].ceiling {
                return Err(ConfigError::RiskLadderNotMonotonic);
            }
        }
        Ok(())
    }

    fn validate_costs(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("commission_rate", self.costs.commission_rate),
            ("slippage_rate", self.costs.slippage_rate),
        ] {
            if !(value.is_finite() && (0.0..1.0).contains(&value)) {
                return Err(ConfigError::InvalidCostRate { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> BacktestConfig {
    BacktestConfig {
        universe: vec!["510300".into(), "510500".into(), "159915".into()],
        benchmark: "000300".into(),
        start: NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
        end: NaiveDate::from_ymd_opt(2023, 12, 29).unwrap(),
        ..BacktestConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(test_config().validate(), Ok(()));
    }

    #[test]
    fn run_id_deterministic_and_sensitive() {
        let a = test_config();
        let mut b = test_config();
        assert_eq!(a.run_id(), b.run_id());
        b.selection.max_correlation = 0.8;
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn rejects_zero_legs() {
        let mut c = test_config();
        c.regime.trend_legs = 0;
        assert_eq!(
            c.validate(),
            Err(ConfigError::InvalidMaxLegs {
                regime: "trend",
                legs: 0
            })
        );
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut c = test_config();
        c.selection.min_percentile = 120.0;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::PercentileOutOfRange(_))
        ));

        let mut c = test_config();
        c.selection.max_correlation = 1.5;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::CorrelationOutOfRange(_))
        ));

        let mut c = test_config();
        c.costs.slippage_rate = -0.01;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidCostRate { .. })));
    }

    #[test]
    fn rejects_bad_dates_and_universe() {
        let mut c = test_config();
        c.end = c.start;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidDateRange { .. })
        ));

        let mut c = test_config();
        c.universe.push("510300".into());
        assert_eq!(
            c.validate(),
            Err(ConfigError::DuplicateAsset("510300".into()))
        );
    }

    #[test]
    fn rejects_overexposed_legs() {
        let mut c = test_config();
        c.regime.trend_legs = 6;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidLegExposure { regime: "trend", .. })
        ));
    }

    #[test]
    fn rejects_non_monotonic_ladder() {
        let mut c = test_config();
        c.risk.ladder = vec![
            RiskRung {
                drawdown: -0.10,
                ceiling: 0.20,
            },
            RiskRung {
                drawdown: -0.20,
                ceiling: 0.30,
            },
        ];
        assert_eq!(c.validate(), Err(ConfigError::RiskLadderNotMonotonic));
    }

    #[test]
    fn minimal_document_uses_defaults() {
        let src = r#"{
            "universe": ["510300", "159915"],
            "benchmark": "000300",
            "start": "2022-01-04",
            "end": "2023-06-30",
            "selection": { "max_correlation": 0.8 }
        }"#;
        let c: BacktestConfig = serde_json::from_str(src).unwrap();
        assert_eq!(c.selection.max_correlation, 0.8);
        assert_eq!(c.selection.min_percentile, 60.0);
        assert_eq!(c.momentum.windows.len(), 2);
        assert_eq!(c.rebalance, RebalanceFrequency::Weekly);
        assert_eq!(c.validate(), Ok(()));
    }
}
