//! Drawdown ladder with hysteresis.
//!
//! The level steps up as drawdown deepens and only returns to zero when
//! equity sets a new strict high. Each transition is recorded.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{RiskConfig, RiskRung};

/// Ordinal risk level; 0 is uncapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskLevel(pub u8);

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    Escalated,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub date: NaiveDate,
    pub from: RiskLevel,
    pub to: RiskLevel,
    pub drawdown: f64,
    pub equity: f64,
    pub peak_equity: f64,
    pub kind: RiskEventKind,
}

#[derive(Debug, Clone)]
pub struct PortfolioRiskManager {
    /// Least severe rung first.
    ladder: Vec<RiskRung>,
    peak_equity: f64,
    level: RiskLevel,
    drawdown: f64,
}

impl PortfolioRiskManager {
    pub fn new(cfg: &RiskConfig, initial_equity: f64) -> Self {
        let mut ladder = cfg.ladder.clone();
        ladder.sort_by(|a, b| b.drawdown.total_cmp(&a.drawdown));
        Self {
            ladder,
            peak_equity: initial_equity,
            level: RiskLevel::default(),
            drawdown: 0.0,
        }
    }

    pub fn level(&self) -> RiskLevel {
        self.level
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    pub fn drawdown(&self) -> f64 {
        self.drawdown
    }

    /// Satellite exposure ceiling at the current level; `None` when uncapped.
    pub fn ceiling(&self) -> Option<f64> {
        match self.level.0 {
            0 => None,
            n => self.ladder.get(usize::from(n) - 1).map(|r| r.ceiling),
        }
    }

    /// Multiplier applied to every leg so the sleeve fits under the ceiling.
    /// Never above 1.
    pub fn scale(&self, satellite_total: f64) -> f64 {
        match self.ceiling() {
            Some(ceiling) if satellite_total > ceiling => ceiling / satellite_total,
            _ => 1.0,
        }
    }

    /// Level implied by a drawdown alone, ignoring hysteresis.
    pub fn level_for(&self, drawdown: f64) -> RiskLevel {
        let n = self
            .ladder
            .iter()
            .take_while(|r| drawdown <= r.drawdown)
            .count();
        RiskLevel(u8::try_from(n).unwrap_or(u8::MAX))
    }

    /// Observe marked equity for `date`; returns the transition, if any.
    pub fn observe(&mut self, date: NaiveDate, equity: f64) -> Option<RiskEvent> {
        let from = self.level;

        if equity > self.peak_equity {
            self.peak_equity = equity;
            self.drawdown = 0.0;
            self.level = RiskLevel(0);
            return (from.0 > 0).then(|| self.event(date, from, equity, RiskEventKind::Reset));
        }

        self.drawdown = if self.peak_equity > 0.0 {
            equity / self.peak_equity - 1.0
        } else {
            0.0
        };
        let target = self.level_for(self.drawdown);
        if target > self.level {
            self.level = target;
            return Some(self.event(date, from, equity, RiskEventKind::Escalated));
        }
        None
    }

    fn event(
        &self,
        date: NaiveDate,
        from: RiskLevel,
        equity: f64,
        kind: RiskEventKind,
    ) -> RiskEvent {
        RiskEvent {
            date,
            from,
            to: self.level,
            drawdown: self.drawdown,
            equity,
            peak_equity: self.peak_equity,
            kind,
        }
    }
}
