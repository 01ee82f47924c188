//! Price data: single-asset points, benchmark bars, and the aligned close panel.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::data::align::align_closes;

/// One daily close for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Daily benchmark bar.
///
/// High and low are optional: many index feeds only publish closes, in which
/// case true range falls back to the close-to-close move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
}

impl PriceBar {
    pub fn close_only(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            close,
            high: None,
            low: None,
        }
    }
}

/// Why a benchmark series cannot be trusted from a given date onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesFault {
    NonFiniteClose,
    NonPositiveClose,
    DateOutOfOrder,
}

impl fmt::Display for SeriesFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesFault::NonFiniteClose => write!(f, "non-finite close"),
            SeriesFault::NonPositiveClose => write!(f, "non-positive close"),
            SeriesFault::DateOutOfOrder => write!(f, "dates not strictly increasing"),
        }
    }
}

/// Benchmark index series as delivered by a `BenchmarkProvider`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub code: String,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(code: impl Into<String>, bars: Vec<PriceBar>) -> Self {
        Self {
            code: code.into(),
            bars,
        }
    }

    /// First bar that breaks the series contract, if any.
    ///
    /// Everything strictly before the returned date is usable.
    pub fn first_fault(&self) -> Option<(NaiveDate, SeriesFault)> {
        let mut prev: Option<NaiveDate> = None;
        for bar in &self.bars {
            if let Some(p) = prev {
                if bar.date <= p {
                    return Some((bar.date, SeriesFault::DateOutOfOrder));
                }
            }
            if !bar.close.is_finite() {
                return Some((bar.date, SeriesFault::NonFiniteClose));
            }
            if bar.close <= 0.0 {
                return Some((bar.date, SeriesFault::NonPositiveClose));
            }
            prev = Some(bar.date);
        }
        None
    }

    /// The bars strictly before the first fault, or the whole series.
    pub fn usable_prefix(&self) -> PriceSeries {
        let bars = match self.first_fault() {
            Some((fault_date, _)) => self
                .bars
                .iter()
                .take_while(|b| b.date < fault_date && b.close.is_finite() && b.close > 0.0)
                .copied()
                .collect(),
            None => self.bars.clone(),
        };
        PriceSeries::new(self.code.clone(), bars)
    }
}

/// Multi-asset daily closes aligned to one ascending date axis.
///
/// A session on which an asset printed no close holds `NaN`. Log returns are
/// derived once at construction; the panel is immutable afterwards and is
/// meant to be shared behind an `Arc` across concurrent runs.
#[derive(Debug, Clone)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    closes: BTreeMap<String, Vec<f64>>,
    log_returns: BTreeMap<String, Vec<f64>>,
    first_valid: BTreeMap<String, usize>,
}

impl PricePanel {
    /// Build a panel from per-asset point lists (any order, duplicates: last wins).
    pub fn from_points(series: BTreeMap<String, Vec<PricePoint>>) -> Self {
        let (dates, closes) = align_closes(&series);
        Self::from_aligned(dates, closes)
    }

    /// Build a panel from an already-aligned axis.
    ///
    /// Each close vector is truncated or `NaN`-padded to the axis length.
    pub fn from_aligned(dates: Vec<NaiveDate>, mut closes: BTreeMap<String, Vec<f64>>) -> Self {
        let n = dates.len();
        let mut log_returns = BTreeMap::new();
        let mut first_valid = BTreeMap::new();

        for (code, series) in closes.iter_mut() {
            series.resize(n, f64::NAN);
            if let Some(idx) = series.iter().position(|c| is_valid_price(*c)) {
                first_valid.insert(code.clone(), idx);
            }
            log_returns.insert(code.clone(), log_return_series(series));
        }

        Self {
            dates,
            closes,
            log_returns,
            first_valid,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Asset codes in ascending order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.closes.keys().map(|c| c.as_str())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.closes.contains_key(code)
    }

    pub fn closes(&self, code: &str) -> Option<&[f64]> {
        self.closes.get(code).map(|v| v.as_slice())
    }

    pub fn log_returns(&self, code: &str) -> Option<&[f64]> {
        self.log_returns.get(code).map(|v| v.as_slice())
    }

    /// The close printed exactly at `index`, if any.
    pub fn close_at(&self, code: &str, index: usize) -> Option<f64> {
        self.closes
            .get(code)
            .and_then(|v| v.get(index).copied())
            .filter(|c| is_valid_price(*c))
    }

    /// The most recent valid close at or before `index`, with its index.
    pub fn last_close_at_or_before(&self, code: &str, index: usize) -> Option<(usize, f64)> {
        let series = self.closes.get(code)?;
        let end = index.min(series.len().checked_sub(1)?);
        (0..=end)
            .rev()
            .find(|&i| is_valid_price(series[i]))
            .map(|i| (i, series[i]))
    }

    /// Index of the first session with a valid close.
    pub fn first_valid_index(&self, code: &str) -> Option<usize> {
        self.first_valid.get(code).copied()
    }

    /// Index of the first session on or after `date`.
    pub fn index_at_or_after(&self, date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d < date)
    }

    /// Index of the last session on or before `date`.
    pub fn index_at_or_before(&self, date: NaiveDate) -> Option<usize> {
        self.dates.partition_point(|d| *d <= date).checked_sub(1)
    }
}

pub(crate) fn is_valid_price(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// ln(c[t] / c[t-1]); `NaN` when either side is missing.
fn log_return_series(closes: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    for i in 1..closes.len() {
        let (prev, cur) = (closes[i - 1], closes[i]);
        if is_valid_price(prev) && is_valid_price(cur) {
            out[i] = (cur / prev).ln();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn panel() -> PricePanel {
        let mut series = BTreeMap::new();
        series.insert(
            "510300".to_string(),
            vec![
                PricePoint::new(d("2024-01-02"), 10.0),
                PricePoint::new(d("2024-01-03"), 11.0),
                PricePoint::new(d("2024-01-04"), 12.1),
            ],
        );
        series.insert(
            "159915".to_string(),
            vec![
                PricePoint::new(d("2024-01-03"), 5.0),
                PricePoint::new(d("2024-01-04"), 5.5),
            ],
        );
        PricePanel::from_points(series)
    }

    #[test]
    fn panel_aligns_to_union_axis() {
        let p = panel();
        assert_eq!(p.len(), 3);
        assert_eq!(p.codes().collect::<Vec<_>>(), vec!["159915", "510300"]);
        assert!(p.closes("159915").unwrap()[0].is_nan());
        assert_eq!(p.first_valid_index("159915"), Some(1));
        assert_eq!(p.first_valid_index("510300"), Some(0));
    }

    #[test]
    fn log_returns_skip_missing_sessions() {
        let p = panel();
        let r = p.log_returns("159915").unwrap();
        assert!(r[0].is_nan());
        assert!(r[1].is_nan());
        assert!((r[2] - (1.1f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn last_close_carries_back() {
        let mut series = BTreeMap::new();
        series.insert(
            "A".to_string(),
            vec![
                PricePoint::new(d("2024-01-02"), 1.0),
                PricePoint::new(d("2024-01-04"), 3.0),
            ],
        );
        series.insert("B".to_string(), vec![PricePoint::new(d("2024-01-03"), 2.0)]);
        let p = PricePanel::from_points(series);
        assert_eq!(p.close_at("A", 1), None);
        assert_eq!(p.last_close_at_or_before("A", 1), Some((0, 1.0)));
        assert_eq!(p.last_close_at_or_before("B", 0), None);
    }

    #[test]
    fn date_lookups() {
        let p = panel();
        assert_eq!(p.index_at_or_after(d("2024-01-01")), 0);
        assert_eq!(p.index_at_or_after(d("2024-01-03")), 1);
        assert_eq!(p.index_at_or_after(d("2024-02-01")), 3);
        assert_eq!(p.index_at_or_before(d("2024-01-01")), None);
        assert_eq!(p.index_at_or_before(d("2024-01-05")), Some(2));
    }

    #[test]
    fn series_fault_detection() {
        let ok = PriceSeries::new(
            "000300",
            vec![
                PriceBar::close_only(d("2024-01-02"), 100.0),
                PriceBar::close_only(d("2024-01-03"), 101.0),
            ],
        );
        assert_eq!(ok.first_fault(), None);

        let bad = PriceSeries::new(
            "000300",
            vec![
                PriceBar::close_only(d("2024-01-02"), 100.0),
                PriceBar::close_only(d("2024-01-03"), f64::NAN),
            ],
        );
        assert_eq!(
            bad.first_fault(),
            Some((d("2024-01-03"), SeriesFault::NonFiniteClose))
        );

        let unordered = PriceSeries::new(
            "000300",
            vec![
                PriceBar::close_only(d("2024-01-03"), 100.0),
                PriceBar::close_only(d("2024-01-02"), 100.0),
            ],
        );
        assert_eq!(
            unordered.first_fault(),
            Some((d("2024-01-02"), SeriesFault::DateOutOfOrder))
        );
    }
}
