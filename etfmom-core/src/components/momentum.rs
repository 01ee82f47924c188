//! Blended momentum score and cross-sectional percentile rank.
//!
//! `score = Σ weight_i · (close[t] / close[t − window_i] − 1)`, with windows
//! counted in sessions on the panel axis. Assets without enough history are
//! excluded from the cross-section, never scored as zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::MomentumWindow;
use crate::domain::PricePanel;

/// Why an asset has no score on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreExclusion {
    InsufficientHistory { required: usize, available: usize },
    NoPrice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumRecord {
    pub code: String,
    pub date: NaiveDate,
    pub score: f64,
    /// Cross-sectional rank in [0, 100].
    pub percentile: f64,
}

/// Scored asset handed to the selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub score: f64,
    pub percentile: f64,
}

/// All momentum output for one rebalance date.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumSnapshot {
    pub date: NaiveDate,
    /// Ordered by score descending, ties by code ascending.
    /// Empty when fewer than two assets could be scored.
    pub records: Vec<MomentumRecord>,
    pub excluded: Vec<(String, ScoreExclusion)>,
    /// Number of assets with a valid score, including a lone one.
    pub scored_count: usize,
}

impl MomentumSnapshot {
    /// True when the cross-section is too thin to rank.
    pub fn is_degenerate(&self) -> bool {
        self.scored_count < 2
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.records
            .iter()
            .map(|r| Candidate {
                code: r.code.clone(),
                score: r.score,
                percentile: r.percentile,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MomentumScorer {
    windows: Vec<MomentumWindow>,
    max_window: usize,
}

impl MomentumScorer {
    pub fn new(windows: Vec<MomentumWindow>) -> Self {
        let max_window = windows.iter().map(|w| w.sessions).max().unwrap_or(0);
        Self {
            windows,
            max_window,
        }
    }

    /// Sessions of history an asset needs before it can be scored.
    pub fn required_sessions(&self) -> usize {
        self.max_window + 1
    }

    /// Blended score of one asset at panel `index`.
    pub fn score_asset(
        &self,
        panel: &PricePanel,
        code: &str,
        index: usize,
    ) -> Result<f64, ScoreExclusion> {
        let first = panel.first_valid_index(code).ok_or(ScoreExclusion::NoPrice)?;
        if first > index {
            return Err(ScoreExclusion::NoPrice);
        }
        let available = index - first + 1;
        if available < self.required_sessions() {
            return Err(ScoreExclusion::InsufficientHistory {
                required: self.required_sessions(),
                available,
            });
        }

        let (_, current) = panel
            .last_close_at_or_before(code, index)
            .ok_or(ScoreExclusion::NoPrice)?;

        let mut score = 0.0;
        for w in &self.windows {
            let (_, past) = panel
                .last_close_at_or_before(code, index - w.sessions)
                .ok_or(ScoreExclusion::NoPrice)?;
            score += w.weight * (current / past - 1.0);
        }
        Ok(score)
    }

    /// Score and rank `universe` at panel `index`.
    pub fn score(&self, panel: &PricePanel, universe: &[String], index: usize) -> MomentumSnapshot {
        let date = panel.dates().get(index).copied().unwrap_or_default();
        let mut scored: Vec<(String, f64)> = Vec::new();
        let mut excluded = Vec::new();

        for code in universe {
            match self.score_asset(panel, code, index) {
                Ok(score) if score.is_finite() => scored.push((code.clone(), score)),
                Ok(_) => excluded.push((code.clone(), ScoreExclusion::NoPrice)),
                Err(reason) => excluded.push((code.clone(), reason)),
            }
        }

        let scored_count = scored.len();
        if scored_count < 2 {
            return MomentumSnapshot {
                date,
                records: Vec::new(),
                excluded,
                scored_count,
            };
        }

        let scores: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();
        let pct = percentile_ranks(&scores);

        let mut records: Vec<MomentumRecord> = scored
            .into_iter()
            .zip(pct)
            .map(|((code, score), percentile)| MomentumRecord {
                code,
                date,
                score,
                percentile,
            })
            .collect();
        records.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.code.cmp(&b.code)));

        MomentumSnapshot {
            date,
            records,
            excluded,
            scored_count,
        }
    }
}

/// `rank / (N − 1) × 100` with 0-based ascending ranks; ties share the average rank.
pub fn percentile_ranks(scores: &[f64]) -> Vec<f64> {
    let n = scores.len();
    let mut out = vec![0.0; n];
    if n < 2 {
        return out;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0;
        for &idx in &order[i..=j] {
            out[idx] = avg_rank / (n - 1) as f64 * 100.0;
        }
        i = j + 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PricePoint;
    use std::collections::BTreeMap;

    fn panel(series: &[(&str, Vec<f64>)]) -> PricePanel {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut map = BTreeMap::new();
        for (code, closes) in series {
            let points = closes
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.is_nan())
                .map(|(i, &c)| PricePoint::new(base + chrono::Duration::days(i as i64), c))
                .collect();
            map.insert(code.to_string(), points);
        }
        // Keep a full-length axis even if every asset skips a date.
        let axis: Vec<PricePoint> = (0..series[0].1.len())
            .map(|i| PricePoint::new(base + chrono::Duration::days(i as i64), 1.0))
            .collect();
        map.insert("~AXIS".to_string(), axis);
        PricePanel::from_points(map)
    }

    fn windows() -> Vec<MomentumWindow> {
        vec![
            MomentumWindow {
                sessions: 2,
                weight: 0.6,
            },
            MomentumWindow {
                sessions: 4,
                weight: 0.4,
            },
        ]
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blended_score() {
        let p = panel(&[("A", vec![100.0, 100.0, 110.0, 120.0, 132.0])]);
        let scorer = MomentumScorer::new(windows());
        // 0.6 * (132/110 - 1) + 0.4 * (132/100 - 1) = 0.6*0.2 + 0.4*0.32
        let s = scorer.score_asset(&p, "A", 4).unwrap();
        assert!((s - (0.12 + 0.128)).abs() < 1e-12);
    }

    #[test]
    fn insufficient_history_is_excluded_not_zero() {
        let p = panel(&[
            ("A", vec![100.0, 101.0, 102.0, 103.0, 104.0]),
            ("B", vec![f64::NAN, f64::NAN, 50.0, 51.0, 52.0]),
            ("C", vec![10.0, 10.0, 10.0, 10.0, 11.0]),
        ]);
        let scorer = MomentumScorer::new(windows());
        let snap = scorer.score(&p, &codes(&["A", "B", "C"]), 4);
        assert_eq!(snap.scored_count, 2);
        assert_eq!(
            snap.excluded,
            vec![(
                "B".to_string(),
                ScoreExclusion::InsufficientHistory {
                    required: 5,
                    available: 3
                }
            )]
        );
        assert!(snap.records.iter().all(|r| r.code != "B"));
    }

    #[test]
    fn fewer_than_two_scored_is_degenerate() {
        let p = panel(&[
            ("A", vec![100.0, 101.0, 102.0, 103.0, 104.0]),
            ("B", vec![f64::NAN, f64::NAN, f64::NAN, 51.0, 52.0]),
        ]);
        let scorer = MomentumScorer::new(windows());
        let snap = scorer.score(&p, &codes(&["A", "B"]), 4);
        assert!(snap.is_degenerate());
        assert!(snap.candidates().is_empty());
        assert_eq!(snap.scored_count, 1);
    }

    #[test]
    fn unknown_asset_has_no_price() {
        let p = panel(&[("A", vec![1.0, 1.0, 1.0, 1.0, 1.0])]);
        let scorer = MomentumScorer::new(windows());
        assert_eq!(
            scorer.score_asset(&p, "ZZZ", 4),
            Err(ScoreExclusion::NoPrice)
        );
    }

    #[test]
    fn records_sorted_with_code_tie_break() {
        let flat = vec![10.0, 10.0, 10.0, 10.0, 11.0];
        let p = panel(&[
            ("B", flat.clone()),
            ("A", flat),
            ("C", vec![10.0, 10.0, 10.0, 10.0, 12.0]),
        ]);
        let scorer = MomentumScorer::new(windows());
        let snap = scorer.score(&p, &codes(&["B", "C", "A"]), 4);
        let order: Vec<&str> = snap.records.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
        // A and B tie at ranks 0 and 1 → average 0.5 / 2 * 100 = 25
        assert!((snap.records[1].percentile - 25.0).abs() < 1e-12);
        assert!((snap.records[2].percentile - 25.0).abs() < 1e-12);
        assert!((snap.records[0].percentile - 100.0).abs() < 1e-12);
    }

    #[test]
    fn percentile_scaling() {
        let pct = percentile_ranks(&[0.3, 0.1, 0.2, 0.4, 0.0]);
        assert_eq!(pct, vec![75.0, 25.0, 50.0, 100.0, 0.0]);
    }

    #[test]
    fn missing_print_today_uses_last_close() {
        let p = panel(&[
            ("A", vec![100.0, 100.0, 110.0, 120.0, f64::NAN]),
            ("B", vec![10.0, 10.0, 10.0, 10.0, 10.0]),
        ]);
        let scorer = MomentumScorer::new(windows());
        // current = 120 (carried), past(2) = 110, past(0) = 100
        let s = scorer.score_asset(&p, "A", 4).unwrap();
        assert!((s - (0.6 * (120.0 / 110.0 - 1.0) + 0.4 * 0.2)).abs() < 1e-12);
    }
}
