//! Price providers for the runner.
//!
//! - `CsvDirectoryProvider`: one file per code, `<dir>/<CODE>.csv`, with a
//!   `date,close` header and optional `high,low` columns. Assets and the
//!   benchmark are read the same way.
//! - `SyntheticProvider`: deterministic random walk per code, seeded from
//!   BLAKE3 of the code and a run seed. Developer-only; results on synthetic
//!   data are for smoke testing the pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::debug;

use etfmom_core::data::{BenchmarkProvider, DataError, PriceHistoryProvider};
use etfmom_core::domain::{PriceBar, PricePanel, PricePoint, PriceSeries};
use etfmom_core::MarketData;

// ─── CSV directory ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    close: f64,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
}

/// Reads `<dir>/<CODE>.csv` for both assets and the benchmark.
#[derive(Debug, Clone)]
pub struct CsvDirectoryProvider {
    dir: PathBuf,
}

impl CsvDirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, code: &str) -> PathBuf {
        self.dir.join(format!("{code}.csv"))
    }

    /// All bars for `code` within `[start, end]`, sorted by date.
    ///
    /// Duplicate dates keep the last row. A missing file or an empty range is
    /// `DataUnavailable`.
    fn read_bars(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        let path = self.path_for(code);
        if !path.exists() {
            return Err(DataError::DataUnavailable {
                code: code.to_string(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| DataError::Io(format!("{}: {e}", path.display())))?;

        let mut by_date = BTreeMap::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| {
                DataError::Parse(format!("{} row {}: {e}", path.display(), line + 1))
            })?;
            if row.date < start || row.date > end {
                continue;
            }
            by_date.insert(
                row.date,
                PriceBar {
                    date: row.date,
                    close: row.close,
                    high: row.high,
                    low: row.low,
                },
            );
        }

        if by_date.is_empty() {
            return Err(DataError::DataUnavailable {
                code: code.to_string(),
            });
        }
        debug!(code, rows = by_date.len(), path = %path.display(), "loaded csv");
        Ok(by_date.into_values().collect())
    }
}

impl PriceHistoryProvider for CsvDirectoryProvider {
    fn name(&self) -> &str {
        "csv-directory"
    }

    fn get_price_panel(
        &self,
        universe: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel, DataError> {
        let mut series = BTreeMap::new();
        for code in universe {
            let points = self
                .read_bars(code, start, end)?
                .into_iter()
                .map(|b| PricePoint::new(b.date, b.close))
                .collect();
            series.insert(code.clone(), points);
        }
        Ok(PricePanel::from_points(series))
    }
}

impl BenchmarkProvider for CsvDirectoryProvider {
    fn get_index_series(
        &self,
        index_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, DataError> {
        Ok(PriceSeries::new(index_code, self.read_bars(index_code, start, end)?))
    }
}

// ─── Synthetic ──────────────────────────────────────────────────────

/// Seeded random-walk provider.
///
/// The same `(code, seed, start, end)` always yields the same series. Each
/// code gets its own drift so momentum ranks are not all ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticProvider {
    seed: u64,
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn rng_for(&self, code: &str) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(code.as_bytes());
        hasher.update(&self.seed.to_le_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    fn bars(&self, code: &str, start: NaiveDate, end: NaiveDate) -> Vec<PriceBar> {
        let mut rng = self.rng_for(code);
        let drift: f64 = rng.gen_range(-0.0004..0.0008);
        let mut price = 100.0_f64;
        let mut bars = Vec::new();

        let mut current = start;
        while current <= end {
            if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                let shock: f64 = rng.gen_range(-0.02..0.02);
                let open = price;
                price *= 1.0 + drift + shock;
                let high = open.max(price) * (1.0 + rng.gen_range(0.0..0.005));
                let low = open.min(price) * (1.0 - rng.gen_range(0.0..0.005));
                bars.push(PriceBar {
                    date: current,
                    close: price,
                    high: Some(high),
                    low: Some(low),
                });
            }
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        bars
    }
}

impl PriceHistoryProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn get_price_panel(
        &self,
        universe: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel, DataError> {
        let series = universe
            .iter()
            .map(|code| {
                let points = self
                    .bars(code, start, end)
                    .into_iter()
                    .map(|b| PricePoint::new(b.date, b.close))
                    .collect();
                (code.clone(), points)
            })
            .collect();
        Ok(PricePanel::from_points(series))
    }
}

impl BenchmarkProvider for SyntheticProvider {
    fn get_index_series(
        &self,
        index_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, DataError> {
        Ok(PriceSeries::new(index_code, self.bars(index_code, start, end)))
    }
}

// ─── Fingerprint ────────────────────────────────────────────────────

/// Deterministic BLAKE3 hash over the panel and benchmark.
///
/// Codes are visited in sorted order so the hash is independent of how the
/// data was loaded.
pub fn dataset_hash(data: &MarketData) -> String {
    let mut hasher = blake3::Hasher::new();

    for date in data.panel.dates() {
        hasher.update(date.to_string().as_bytes());
    }
    let mut codes: Vec<&str> = data.panel.codes().collect();
    codes.sort_unstable();
    for code in codes {
        hasher.update(code.as_bytes());
        for close in data.panel.closes(code).unwrap_or_default() {
            hasher.update(&close.to_le_bytes());
        }
    }

    hasher.update(data.benchmark.code.as_bytes());
    for bar in &data.benchmark.bars {
        hasher.update(bar.date.to_string().as_bytes());
        hasher.update(&bar.close.to_le_bytes());
    }

    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn csv_reads_close_only_and_ohlc_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("510300.csv"),
            "date,close\n2024-01-03,3.51\n2024-01-02,3.50\n2024-01-04,3.55\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("000300.csv"),
            "date,close,high,low\n2024-01-02,3400,3410,3390\n2024-01-03,3420,3430,3401\n",
        )
        .unwrap();

        let provider = CsvDirectoryProvider::new(dir.path());
        let panel = provider
            .get_price_panel(&["510300".to_string()], d(2024, 1, 1), d(2024, 1, 31))
            .unwrap();
        assert_eq!(panel.len(), 3);
        assert_eq!(panel.dates()[0], d(2024, 1, 2));
        assert_eq!(panel.close_at("510300", 0), Some(3.50));

        let bench = provider.get_index_series("000300", d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        assert_eq!(bench.bars.len(), 2);
        assert_eq!(bench.bars[1].high, Some(3430.0));
    }

    #[test]
    fn csv_filters_range() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("A.csv"),
            "date,close\n2023-12-29,1.0\n2024-01-02,1.1\n2024-02-01,1.2\n",
        )
        .unwrap();
        let provider = CsvDirectoryProvider::new(dir.path());
        let panel = provider
            .get_price_panel(&["A".to_string()], d(2024, 1, 1), d(2024, 1, 31))
            .unwrap();
        assert_eq!(panel.len(), 1);
    }

    #[test]
    fn csv_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvDirectoryProvider::new(dir.path());
        let err = provider
            .get_price_panel(&["NOPE".to_string()], d(2024, 1, 1), d(2024, 1, 31))
            .unwrap_err();
        assert_eq!(err, DataError::DataUnavailable { code: "NOPE".into() });
    }

    #[test]
    fn csv_bad_row_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.csv"), "date,close\n2024-01-02,abc\n").unwrap();
        let provider = CsvDirectoryProvider::new(dir.path());
        let err = provider
            .get_price_panel(&["A".to_string()], d(2024, 1, 1), d(2024, 1, 31))
            .unwrap_err();
        assert!(matches!(err, DataError::Parse(_)));
    }

    #[test]
    fn synthetic_is_deterministic_per_code_and_seed() {
        let a = SyntheticProvider::new(7);
        let b = SyntheticProvider::new(7);
        let c = SyntheticProvider::new(8);
        let (s, e) = (d(2024, 1, 1), d(2024, 3, 31));

        let sa = a.get_index_series("X", s, e).unwrap();
        assert_eq!(sa, b.get_index_series("X", s, e).unwrap());
        assert_ne!(sa, c.get_index_series("X", s, e).unwrap());
        assert_ne!(sa.bars, a.get_index_series("Y", s, e).unwrap().bars);
    }

    #[test]
    fn synthetic_skips_weekends() {
        let bars = SyntheticProvider::new(1).bars("X", d(2024, 1, 1), d(2024, 1, 14));
        assert_eq!(bars.len(), 10);
        assert!(bars
            .iter()
            .all(|b| !matches!(b.date.weekday(), Weekday::Sat | Weekday::Sun)));
        assert!(bars.iter().all(|b| b.close > 0.0 && b.low <= Some(b.close)));
    }

    #[test]
    fn dataset_hash_is_stable() {
        let p = SyntheticProvider::new(3);
        let (s, e) = (d(2024, 1, 1), d(2024, 2, 28));
        let codes = vec!["A".to_string(), "B".to_string()];
        let data = |codes: &[String]| {
            MarketData::new(
                p.get_price_panel(codes, s, e).unwrap(),
                p.get_index_series("IDX", s, e).unwrap(),
            )
        };
        let reversed: Vec<String> = codes.iter().rev().cloned().collect();
        assert_eq!(dataset_hash(&data(&codes)), dataset_hash(&data(&reversed)));
        assert_ne!(dataset_hash(&data(&codes)), dataset_hash(&data(&codes[..1])));
    }
}
