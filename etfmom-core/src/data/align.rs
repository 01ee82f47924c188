//! Multi-asset time alignment.
//!
//! Asset closes are aligned to the union of all dates with strict `NaN` for
//! missing sessions (no forward-fill of tradable prices). The benchmark is
//! aligned onto the panel axis with carry-forward, since it only feeds
//! indicators.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::price::{PricePoint, PriceSeries};

/// Align point lists to a common ascending date axis.
pub fn align_closes(
    series: &BTreeMap<String, Vec<PricePoint>>,
) -> (Vec<NaiveDate>, BTreeMap<String, Vec<f64>>) {
    let mut all_dates = BTreeSet::new();
    for points in series.values() {
        for p in points {
            all_dates.insert(p.date);
        }
    }
    let dates: Vec<NaiveDate> = all_dates.into_iter().collect();
    let position: HashMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut closes = BTreeMap::new();
    for (code, points) in series {
        let mut aligned = vec![f64::NAN; dates.len()];
        for p in points {
            if let Some(&i) = position.get(&p.date) {
                aligned[i] = p.close;
            }
        }
        closes.insert(code.clone(), aligned);
    }

    (dates, closes)
}

/// Benchmark values on the panel axis.
#[derive(Debug, Clone)]
pub struct BenchmarkTrack {
    pub close: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    /// True where the close was carried forward from an earlier session.
    pub carried: Vec<bool>,
}

impl BenchmarkTrack {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

/// Align a benchmark series onto `dates`.
///
/// Sessions without a benchmark bar carry the previous close forward with
/// unknown high/low. Sessions before the first bar stay `NaN`.
pub fn align_benchmark(dates: &[NaiveDate], series: &PriceSeries) -> BenchmarkTrack {
    let by_date: HashMap<NaiveDate, usize> = series
        .bars
        .iter()
        .enumerate()
        .map(|(i, b)| (b.date, i))
        .collect();

    let n = dates.len();
    let mut track = BenchmarkTrack {
        close: vec![f64::NAN; n],
        high: vec![f64::NAN; n],
        low: vec![f64::NAN; n],
        carried: vec![false; n],
    };

    let mut last_close = f64::NAN;
    for (i, date) in dates.iter().enumerate() {
        match by_date.get(date) {
            Some(&b) => {
                let bar = &series.bars[b];
                track.close[i] = bar.close;
                track.high[i] = bar.high.unwrap_or(f64::NAN);
                track.low[i] = bar.low.unwrap_or(f64::NAN);
                last_close = bar.close;
            }
            None if !last_close.is_nan() => {
                track.close[i] = last_close;
                track.carried[i] = true;
            }
            None => {}
        }
    }

    track
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PriceBar;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn align_fills_missing_with_nan() {
        let mut input = BTreeMap::new();
        input.insert(
            "510300".to_string(),
            vec![
                PricePoint::new(d("2024-01-02"), 100.0),
                PricePoint::new(d("2024-01-03"), 101.0),
                PricePoint::new(d("2024-01-04"), 102.0),
            ],
        );
        input.insert(
            "512100".to_string(),
            vec![
                PricePoint::new(d("2024-01-02"), 200.0),
                PricePoint::new(d("2024-01-04"), 202.0),
            ],
        );

        let (dates, closes) = align_closes(&input);
        assert_eq!(dates.len(), 3);
        assert_eq!(closes["510300"][1], 101.0);
        assert!(closes["512100"][1].is_nan());
        assert_eq!(closes["512100"][2], 202.0);
    }

    #[test]
    fn benchmark_carries_forward() {
        let dates = vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-04"), d("2024-01-05")];
        let series = PriceSeries::new(
            "000300",
            vec![
                PriceBar {
                    date: d("2024-01-03"),
                    close: 10.0,
                    high: Some(10.5),
                    low: Some(9.5),
                },
                PriceBar::close_only(d("2024-01-05"), 11.0),
            ],
        );
        let track = align_benchmark(&dates, &series);
        assert!(track.close[0].is_nan());
        assert_eq!(track.close[1], 10.0);
        assert_eq!(track.high[1], 10.5);
        assert_eq!(track.close[2], 10.0);
        assert!(track.carried[2]);
        assert!(track.high[2].is_nan());
        assert_eq!(track.close[3], 11.0);
        assert!(!track.carried[3]);
    }
}
