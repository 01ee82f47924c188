//! Constrained leg selection: momentum floor, then a correlation-aware greedy walk.
//!
//! The walk admits candidates in score order and never revisits an admission,
//! so a high-scoring leg can crowd out a pair of lower-scoring legs that would
//! have been mutually uncorrelated. This is a heuristic, not an optimal
//! diversified subset; it is kept because it is deterministic and cheap.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::components::momentum::{Candidate, MomentumSnapshot};
use crate::config::SelectionConfig;
use crate::domain::PricePanel;
use crate::indicators::pearson_pairwise;

// ─── Correlation matrix ─────────────────────────────────────────────

/// Pairwise log-return correlations among a set of codes on one date.
///
/// `None` entries mean the correlation is unknown (too few overlapping
/// returns, or zero variance).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationMatrix {
    codes: Vec<String>,
    values: Vec<Option<f64>>,
}

impl CorrelationMatrix {
    /// Correlate `codes` over the `window` log returns ending at `index`.
    pub fn compute(
        panel: &PricePanel,
        codes: &[String],
        index: usize,
        window: usize,
        min_obs: usize,
    ) -> Self {
        let n = codes.len();
        let mut values = vec![None; n * n];
        for i in 0..n {
            values[i * n + i] = Some(1.0);
            let Some(a) = panel.log_returns(&codes[i]) else {
                continue;
            };
            for j in (i + 1)..n {
                let Some(b) = panel.log_returns(&codes[j]) else {
                    continue;
                };
                let rho = pearson_pairwise(a, b, index, window, min_obs);
                values[i * n + j] = rho;
                values[j * n + i] = rho;
            }
        }
        Self {
            codes: codes.to_vec(),
            values,
        }
    }

    /// Build from explicit symmetric pairs. Unlisted pairs are unknown.
    pub fn from_pairs(pairs: &[(&str, &str, f64)]) -> Self {
        let mut codes: Vec<String> = pairs
            .iter()
            .flat_map(|(a, b, _)| [a.to_string(), b.to_string()])
            .collect();
        codes.sort();
        codes.dedup();
        let n = codes.len();
        let mut values = vec![None; n * n];
        for i in 0..n {
            values[i * n + i] = Some(1.0);
        }
        for (a, b, rho) in pairs {
            if let (Some(i), Some(j)) = (
                codes.iter().position(|c| c == a),
                codes.iter().position(|c| c == b),
            ) {
                values[i * n + j] = Some(*rho);
                values[j * n + i] = Some(*rho);
            }
        }
        Self { codes, values }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let n = self.codes.len();
        let i = self.codes.iter().position(|c| c == a)?;
        let j = self.codes.iter().position(|c| c == b)?;
        self.values[i * n + j]
    }
}

// ─── Diagnostics ────────────────────────────────────────────────────

/// Per-candidate verdict, in walk order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SelectionDiagnostic {
    Admitted,
    RejectedByFloor {
        percentile: f64,
        floor: f64,
    },
    RejectedByCorrelation {
        conflict_with: String,
        value: f64,
        limit: f64,
    },
    /// Sold on a stop-loss this date; not eligible for re-entry.
    BlockedByStopLoss,
    /// Capacity was reached before this candidate was reached.
    NotConsidered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDiagnostic {
    pub code: String,
    pub score: f64,
    pub percentile: f64,
    #[serde(flatten)]
    pub verdict: SelectionDiagnostic,
}

impl fmt::Display for CandidateDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.verdict {
            SelectionDiagnostic::Admitted => write!(f, "{} admitted", self.code),
            SelectionDiagnostic::RejectedByFloor { percentile, floor } => write!(
                f,
                "{} excluded: percentile {:.1} < {:.1}",
                self.code, percentile, floor
            ),
            SelectionDiagnostic::RejectedByCorrelation {
                conflict_with,
                value,
                limit,
            } => write!(
                f,
                "{} excluded: correlation {:.2} > {:.2} with {}",
                self.code, value, limit, conflict_with
            ),
            SelectionDiagnostic::BlockedByStopLoss => {
                write!(f, "{} excluded: stopped out this date", self.code)
            }
            SelectionDiagnostic::NotConsidered => {
                write!(f, "{} not considered: leg capacity reached", self.code)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOutcome {
    Selected,
    /// Nothing met the momentum floor; the sleeve is all cash this period.
    NoQualifiedCandidates,
    /// Fewer than two assets could be scored.
    InsufficientUniverse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub date: NaiveDate,
    pub outcome: SelectionOutcome,
    pub max_legs: usize,
    /// Admitted legs in score order.
    pub admitted: Vec<Candidate>,
    pub diagnostics: Vec<CandidateDiagnostic>,
    /// Exactly one leg admitted while more were allowed, because every other
    /// qualified candidate conflicted on correlation.
    pub single_leg_exception: bool,
}

impl Selection {
    pub fn codes(&self) -> Vec<String> {
        self.admitted.iter().map(|c| c.code.clone()).collect()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.admitted.iter().any(|c| c.code == code)
    }

    /// The diagnostic recorded for `code`, if it was a candidate.
    pub fn verdict_for(&self, code: &str) -> Option<&SelectionDiagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.code == code)
            .map(|d| &d.verdict)
    }

    fn empty(date: NaiveDate, outcome: SelectionOutcome, max_legs: usize) -> Self {
        Self {
            date,
            outcome,
            max_legs,
            admitted: Vec::new(),
            diagnostics: Vec::new(),
            single_leg_exception: false,
        }
    }
}

// ─── Selector ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConstrainedSelector {
    cfg: SelectionConfig,
}

impl ConstrainedSelector {
    pub fn new(cfg: SelectionConfig) -> Self {
        Self { cfg }
    }

    /// Select legs for one rebalance date from a momentum snapshot.
    ///
    /// Correlations are computed on the panel for the floor-qualified
    /// candidates only.
    pub fn select(
        &self,
        snapshot: &MomentumSnapshot,
        max_legs: usize,
        panel: &PricePanel,
        index: usize,
        blocked: &BTreeSet<String>,
    ) -> Selection {
        if snapshot.is_degenerate() {
            return Selection::empty(
                snapshot.date,
                SelectionOutcome::InsufficientUniverse,
                max_legs,
            );
        }
        let candidates = snapshot.candidates();
        let qualified: Vec<String> = candidates
            .iter()
            .filter(|c| c.percentile >= self.cfg.min_percentile && !blocked.contains(&c.code))
            .map(|c| c.code.clone())
            .collect();
        let matrix = CorrelationMatrix::compute(
            panel,
            &qualified,
            index,
            self.cfg.correlation_window,
            self.cfg.min_correlation_observations,
        );
        self.select_candidates(snapshot.date, &candidates, max_legs, &matrix, blocked)
    }

    /// The selection walk over an explicit candidate list and matrix.
    pub fn select_candidates(
        &self,
        date: NaiveDate,
        candidates: &[Candidate],
        max_legs: usize,
        matrix: &CorrelationMatrix,
        blocked: &BTreeSet<String>,
    ) -> Selection {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.code.cmp(&b.code)));

        let mut diagnostics = Vec::with_capacity(ordered.len());
        let mut admitted: Vec<Candidate> = Vec::new();
        let mut qualified_count = 0usize;
        let mut correlation_rejections = 0usize;

        for c in ordered {
            let verdict = if c.percentile < self.cfg.min_percentile {
                SelectionDiagnostic::RejectedByFloor {
                    percentile: c.percentile,
                    floor: self.cfg.min_percentile,
                }
            } else if blocked.contains(&c.code) {
                SelectionDiagnostic::BlockedByStopLoss
            } else {
                qualified_count += 1;
                if admitted.len() >= max_legs {
                    SelectionDiagnostic::NotConsidered
                } else if let Some((other, rho)) = self.first_conflict(c, &admitted, matrix) {
                    correlation_rejections += 1;
                    SelectionDiagnostic::RejectedByCorrelation {
                        conflict_with: other,
                        value: rho,
                        limit: self.cfg.max_correlation,
                    }
                } else {
                    admitted.push(c.clone());
                    SelectionDiagnostic::Admitted
                }
            };
            diagnostics.push(CandidateDiagnostic {
                code: c.code.clone(),
                score: c.score,
                percentile: c.percentile,
                verdict,
            });
        }

        if qualified_count == 0 {
            let mut selection =
                Selection::empty(date, SelectionOutcome::NoQualifiedCandidates, max_legs);
            selection.diagnostics = diagnostics;
            return selection;
        }

        let single_leg_exception =
            admitted.len() == 1 && max_legs > 1 && correlation_rejections > 0;

        Selection {
            date,
            outcome: SelectionOutcome::Selected,
            max_legs,
            admitted,
            diagnostics,
            single_leg_exception,
        }
    }

    /// First admitted leg whose known correlation with `c` exceeds the ceiling.
    fn first_conflict(
        &self,
        c: &Candidate,
        admitted: &[Candidate],
        matrix: &CorrelationMatrix,
    ) -> Option<(String, f64)> {
        admitted.iter().find_map(|a| match matrix.get(&c.code, &a.code) {
            Some(rho) if rho > self.cfg.max_correlation => Some((a.code.clone(), rho)),
            _ => None,
        })
    }
}
