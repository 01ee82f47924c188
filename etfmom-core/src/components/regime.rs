//! Market regime gate - bounds leg count and per-leg exposure by benchmark state.
//!
//! Two independent gates:
//! - **Trend** (yearline): benchmark close versus its long moving average, with
//!   asymmetric hysteresis. Unlocking needs a run of closes above the MA plus a
//!   clearance band; falling back needs a run of closes through the lower band.
//! - **Chop**: a 2-of-3 vote over band-hugging, volatility-without-slope, and
//!   flat candidate dispersion.
//!
//! The resulting `RegimeState` is a hard constraint on the selector.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::components::momentum::Candidate;
use crate::config::RegimeConfig;
use crate::data::align::BenchmarkTrack;
use crate::indicators::{atr, sma};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Above,
    Below,
}

/// Daily trend state machine.
#[derive(Debug, Clone)]
pub struct TrendGate {
    confirm_sessions: usize,
    unlock_band: f64,
    grace_sessions: usize,
    fallback_band: f64,
    state: Trend,
    above_run: usize,
    breach_run: usize,
}

impl TrendGate {
    pub fn new(cfg: &RegimeConfig) -> Self {
        Self {
            confirm_sessions: cfg.confirm_sessions,
            unlock_band: cfg.unlock_band,
            grace_sessions: cfg.grace_sessions,
            fallback_band: cfg.fallback_band,
            state: Trend::Below,
            above_run: 0,
            breach_run: 0,
        }
    }

    pub fn state(&self) -> Trend {
        self.state
    }

    /// Advance one session.
    pub fn step(&mut self, close: f64, ma: f64) -> Trend {
        if close.is_nan() || ma.is_nan() {
            self.state = Trend::Below;
            self.above_run = 0;
            self.breach_run = 0;
            return self.state;
        }

        if close > ma {
            self.above_run += 1;
        } else {
            self.above_run = 0;
        }

        match self.state {
            Trend::Below => {
                if self.above_run >= self.confirm_sessions
                    && close >= ma * (1.0 + self.unlock_band)
                {
                    self.state = Trend::Above;
                    self.breach_run = 0;
                }
            }
            Trend::Above => {
                if close <= ma * (1.0 - self.fallback_band) {
                    self.breach_run += 1;
                } else {
                    self.breach_run = 0;
                }
                if self.breach_run >= self.grace_sessions {
                    self.state = Trend::Below;
                    self.breach_run = 0;
                }
            }
        }

        self.state
    }
}

/// Fold the trend gate over a full series.
pub fn trend_series(close: &[f64], ma: &[f64], cfg: &RegimeConfig) -> Vec<Trend> {
    let mut gate = TrendGate::new(cfg);
    close
        .iter()
        .zip(ma)
        .map(|(&c, &m)| gate.step(c, m))
        .collect()
}

/// Individual chop conditions for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChopVotes {
    /// Enough recent closes hug the MA band.
    pub band: bool,
    /// High ATR relative to price while the MA is flat.
    pub volatility: bool,
    /// Top candidates are bunched together.
    pub dispersion: bool,
}

impl ChopVotes {
    pub fn count(&self) -> usize {
        [self.band, self.volatility, self.dispersion]
            .iter()
            .filter(|v| **v)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub date: NaiveDate,
    pub trend: Trend,
    pub chop: bool,
    pub votes: ChopVotes,
    pub max_legs: usize,
    pub leg_exposure: f64,
    pub min_holding_multiplier: usize,
    pub stop_loss: f64,
}

/// Precomputes benchmark indicators once, then classifies any session.
#[derive(Debug, Clone)]
pub struct MarketRegimeDetector {
    cfg: RegimeConfig,
    base_stop_loss: f64,
    close: Vec<f64>,
    ma: Vec<f64>,
    atr: Vec<f64>,
    trend: Vec<Trend>,
}

impl MarketRegimeDetector {
    pub fn new(cfg: RegimeConfig, base_stop_loss: f64, track: &BenchmarkTrack) -> Self {
        let ma = sma(&track.close, cfg.ma_period);
        let atr = atr(&track.close, &track.high, &track.low, cfg.atr_period);
        let trend = trend_series(&track.close, &ma, &cfg);
        Self {
            cfg,
            base_stop_loss,
            close: track.close.clone(),
            ma,
            atr,
            trend,
        }
    }

    pub fn trend_at(&self, index: usize) -> Trend {
        self.trend.get(index).copied().unwrap_or(Trend::Below)
    }

    pub fn moving_average(&self) -> &[f64] {
        &self.ma
    }

    /// `candidates` must be ordered by score descending.
    pub fn chop_votes(&self, index: usize, candidates: &[Candidate]) -> ChopVotes {
        ChopVotes {
            band: self.band_vote(index),
            volatility: self.volatility_vote(index),
            dispersion: self.dispersion_vote(candidates),
        }
    }

    fn band_vote(&self, index: usize) -> bool {
        if index >= self.close.len() {
            return false;
        }
        let start = (index + 1).saturating_sub(self.cfg.band_window);
        let hits = (start..=index)
            .filter(|&i| {
                let (c, m) = (self.close[i], self.ma[i]);
                !c.is_nan() && !m.is_nan() && m > 0.0 && (c / m - 1.0).abs() <= self.cfg.band_width
            })
            .count();
        hits >= self.cfg.band_min_hits
    }

    fn volatility_vote(&self, index: usize) -> bool {
        if index < self.cfg.slope_sessions || index >= self.close.len() {
            return false;
        }
        let (c, a, m) = (self.close[index], self.atr[index], self.ma[index]);
        let m_prev = self.ma[index - self.cfg.slope_sessions];
        if [c, a, m, m_prev].iter().any(|v| v.is_nan()) || c <= 0.0 || m_prev <= 0.0 {
            return false;
        }
        let atr_ratio = a / c;
        let slope = (m / m_prev - 1.0).abs();
        atr_ratio >= self.cfg.atr_ratio_threshold && slope <= self.cfg.slope_threshold
    }

    fn dispersion_vote(&self, candidates: &[Candidate]) -> bool {
        if candidates.len() < 5 {
            return false;
        }
        let top1 = candidates[0].score;
        let spread3 = top1 - candidates[2].score;
        let spread5 = top1 - candidates[4].score;
        spread3 < self.cfg.top3_spread && spread5 < self.cfg.top5_spread
    }

    /// Classify session `index` and map the result to downstream bounds.
    pub fn evaluate(&self, index: usize, date: NaiveDate, candidates: &[Candidate]) -> RegimeState {
        let trend = self.trend_at(index);
        let votes = self.chop_votes(index, candidates);
        let chop = votes.count() >= self.cfg.min_chop_votes;

        let (max_legs, leg_exposure, min_holding_multiplier, stop_loss) = match (trend, chop) {
            (Trend::Above, false) => (
                self.cfg.trend_legs,
                self.cfg.trend_leg_exposure,
                1,
                self.base_stop_loss,
            ),
            (Trend::Above, true) => (
                self.cfg.chop_legs,
                self.cfg.chop_leg_exposure,
                self.cfg.chop_min_hold_multiplier,
                self.base_stop_loss.min(self.cfg.chop_stop_loss),
            ),
            (Trend::Below, _) => (
                self.cfg.defensive_legs,
                self.cfg.defensive_leg_exposure,
                1,
                self.base_stop_loss,
            ),
        };

        RegimeState {
            date,
            trend,
            chop,
            votes,
            max_legs,
            leg_exposure,
            min_holding_multiplier,
            stop_loss,
        }
    }
}
