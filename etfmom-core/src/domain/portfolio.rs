//! Portfolio: cash plus satellite holdings, valued in currency and as weights.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One satellite leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub code: String,
    pub entry_date: NaiveDate,
    /// Consecutive rebalances this holding has gone unselected.
    pub observation_counter: u32,
    /// Current share of equity, drifted by daily marks.
    pub weight: f64,
    pub entry_price: f64,
    pub last_price: f64,
    pub value: f64,
    /// Sessions marked since entry.
    pub sessions_held: usize,
    /// True when `last_price` was carried forward on the latest mark.
    pub stale: bool,
}

impl Holding {
    pub fn return_since_entry(&self) -> f64 {
        if self.entry_price > 0.0 {
            self.last_price / self.entry_price - 1.0
        } else {
            0.0
        }
    }
}

/// Aggregate portfolio state.
///
/// The accounting identity holds after every mutation:
/// `equity == cash + sum(holding values)` and
/// `cash_weight + sum(holding weights) == 1`.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub holdings: BTreeMap<String, Holding>,
    pub cash: f64,
    pub equity: f64,
}

/// Target for one leg at a rebalance.
#[derive(Debug, Clone, PartialEq)]
pub struct LegTarget {
    pub code: String,
    pub weight: f64,
    pub price: f64,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            holdings: BTreeMap::new(),
            cash: initial_capital,
            equity: initial_capital,
        }
    }

    pub fn cash_weight(&self) -> f64 {
        if self.equity > 0.0 {
            self.cash / self.equity
        } else {
            1.0
        }
    }

    pub fn satellite_weight(&self) -> f64 {
        self.holdings.values().map(|h| h.weight).sum()
    }

    pub fn weight_of(&self, code: &str) -> f64 {
        self.holdings.get(code).map_or(0.0, |h| h.weight)
    }

    pub fn is_held(&self, code: &str) -> bool {
        self.holdings.contains_key(code)
    }

    /// Revalue one holding at `price`.
    pub fn mark(&mut self, code: &str, price: f64, stale: bool) {
        if let Some(h) = self.holdings.get_mut(code) {
            if h.last_price > 0.0 {
                h.value *= price / h.last_price;
            }
            h.last_price = price;
            h.stale = stale;
            h.sessions_held += 1;
        }
    }

    /// Recompute equity and drifted weights from holding values.
    pub fn refresh(&mut self) {
        self.equity = self.cash + self.holdings.values().map(|h| h.value).sum::<f64>();
        let equity = self.equity;
        for h in self.holdings.values_mut() {
            h.weight = if equity > 0.0 { h.value / equity } else { 0.0 };
        }
    }

    /// Deduct `cost` from equity, then set the satellite sleeve to `targets`.
    ///
    /// Holdings absent from `targets` are closed. Existing holdings keep their
    /// entry metadata and observation counter; new ones start fresh at `date`.
    pub fn rebalance(&mut self, date: NaiveDate, targets: &[LegTarget], cost: f64) {
        let equity = (self.equity - cost).max(0.0);
        let mut next = BTreeMap::new();
        let mut invested = 0.0;

        for t in targets {
            let value = t.weight * equity;
            invested += value;
            let holding = match self.holdings.remove(&t.code) {
                Some(mut h) => {
                    h.value = value;
                    h.weight = t.weight;
                    h
                }
                None => Holding {
                    code: t.code.clone(),
                    entry_date: date,
                    observation_counter: 0,
                    weight: t.weight,
                    entry_price: t.price,
                    last_price: t.price,
                    value,
                    sessions_held: 0,
                    stale: false,
                },
            };
            next.insert(t.code.clone(), holding);
        }

        self.holdings = next;
        self.cash = equity - invested;
        self.equity = equity;
    }
}
