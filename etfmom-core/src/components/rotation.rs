//! Holding rotation with an observation grace period.
//!
//! A held asset that drops out of the selection is not sold immediately; it
//! is observed for `observation_period` rebalances first. Any reappearance
//! resets it. Slot allocation then fits held and new legs under the regime's
//! leg bound.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::components::selector::{Selection, SelectionDiagnostic};
use crate::config::RotationConfig;
use crate::domain::{Portfolio, TradeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "counter", rename_all = "snake_case")]
pub enum RotationState {
    Qualified,
    Observing(u32),
    Removed,
}

impl RotationState {
    /// State for a held asset whose counter is `counter`.
    pub fn from_counter(counter: u32) -> Self {
        if counter == 0 {
            RotationState::Qualified
        } else {
            RotationState::Observing(counter)
        }
    }

    pub fn counter(&self) -> u32 {
        match self {
            RotationState::Qualified => 0,
            RotationState::Observing(n) => *n,
            RotationState::Removed => 0,
        }
    }

    /// One rebalance step. `Removed` is terminal.
    pub fn next(self, selected: bool, observation_period: u32) -> Self {
        match self {
            RotationState::Removed => RotationState::Removed,
            _ if selected => RotationState::Qualified,
            state => {
                let n = state.counter() + 1;
                if n >= observation_period {
                    RotationState::Removed
                } else {
                    RotationState::Observing(n)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedLeg {
    pub code: String,
    pub state: RotationState,
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedExit {
    pub code: String,
    pub reason: TradeReason,
}

/// Counter movement of one held asset at a rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterTransition {
    pub code: String,
    pub from: u32,
    pub to: u32,
    pub state: RotationState,
    /// Removal was due but the holding is younger than the minimum hold.
    pub deferred: bool,
}

/// Membership decision for one rebalance. Weights are assigned afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationPlan {
    /// Final leg set in slot order.
    pub legs: Vec<PlannedLeg>,
    pub exits: Vec<PlannedExit>,
    pub transitions: Vec<CounterTransition>,
}

impl RotationPlan {
    pub fn counter_of(&self, code: &str) -> Option<u32> {
        self.legs
            .iter()
            .find(|l| l.code == code)
            .map(|l| l.state.counter())
    }
}

#[derive(Debug, Clone)]
pub struct RotationTracker {
    cfg: RotationConfig,
}

impl RotationTracker {
    pub fn new(cfg: RotationConfig) -> Self {
        Self { cfg }
    }

    pub fn observation_period(&self) -> u32 {
        self.cfg.observation_period
    }

    /// Reconcile current holdings against a fresh selection.
    ///
    /// `stopped` holds codes already sold on a stop-loss this date; they are
    /// neither held nor eligible. `min_hold_multiplier` scales the minimum
    /// holding period (regime-dependent).
    pub fn reconcile(
        &self,
        portfolio: &Portfolio,
        selection: &Selection,
        min_hold_multiplier: usize,
        stopped: &BTreeSet<String>,
    ) -> RotationPlan {
        let min_hold = self.cfg.min_holding_sessions * min_hold_multiplier.max(1);
        let mut plan = RotationPlan::default();

        let mut held_qualified: Vec<String> = Vec::new();
        let mut held_observing: Vec<(u32, String)> = Vec::new();

        for (code, holding) in &portfolio.holdings {
            if stopped.contains(code) {
                continue;
            }
            let selected = selection.contains(code);
            let before = RotationState::from_counter(holding.observation_counter);
            let mut after = before.next(selected, self.cfg.observation_period);
            let mut deferred = false;
            if after == RotationState::Removed && holding.sessions_held < min_hold {
                after = RotationState::Observing(before.counter() + 1);
                deferred = true;
            }

            plan.transitions.push(CounterTransition {
                code: code.clone(),
                from: before.counter(),
                to: after.counter(),
                state: after,
                deferred,
            });

            match after {
                RotationState::Qualified => held_qualified.push(code.clone()),
                RotationState::Observing(n) => held_observing.push((n, code.clone())),
                RotationState::Removed => plan.exits.push(PlannedExit {
                    code: code.clone(),
                    reason: removal_reason(selection, code),
                }),
            }
        }

        // Held-qualified in selection order.
        held_qualified.sort_by_key(|code| {
            selection
                .admitted
                .iter()
                .position(|c| &c.code == code)
                .unwrap_or(usize::MAX)
        });
        held_observing.sort();

        let max_legs = selection.max_legs;
        let mut legs: Vec<PlannedLeg> = Vec::new();
        let mut overflow: Vec<String> = Vec::new();

        let held = held_qualified
            .into_iter()
            .map(|code| (code, RotationState::Qualified))
            .chain(
                held_observing
                    .into_iter()
                    .map(|(n, code)| (code, RotationState::Observing(n))),
            );
        for (code, state) in held {
            if legs.len() < max_legs {
                legs.push(PlannedLeg {
                    code,
                    state,
                    is_new: false,
                });
            } else {
                overflow.push(code);
            }
        }

        for c in &selection.admitted {
            if legs.len() >= max_legs {
                break;
            }
            if portfolio.is_held(&c.code) || stopped.contains(&c.code) {
                continue;
            }
            legs.push(PlannedLeg {
                code: c.code.clone(),
                state: RotationState::Qualified,
                is_new: true,
            });
        }

        plan.exits.extend(overflow.into_iter().map(|code| PlannedExit {
            code,
            reason: TradeReason::RegimeCap,
        }));
        plan.legs = legs;
        plan
    }
}

/// Why an unselected holding is rotated out.
fn removal_reason(selection: &Selection, code: &str) -> TradeReason {
    match selection.verdict_for(code) {
        Some(SelectionDiagnostic::RejectedByCorrelation { .. }) => TradeReason::Correlation,
        Some(SelectionDiagnostic::NotConsidered) => TradeReason::Rotation,
        // Below the floor or no longer scored.
        _ => TradeReason::Momentum,
    }
}
