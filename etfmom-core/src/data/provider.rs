//! Provider traits and structured data errors.
//!
//! The simulator never performs I/O itself: an ingestion layer implements these
//! traits (CSV directory, synthetic walk, in-memory fixtures) and is injected at
//! construction.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::price::{PricePanel, PricePoint, PriceSeries};

/// Structured error types for data operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("no price history for '{code}' in the requested range")]
    DataUnavailable { code: String },

    #[error("'{code}' has {available} sessions of history, {required} required")]
    InsufficientHistory {
        code: String,
        required: usize,
        available: usize,
    },

    #[error("no asset in the universe has price history")]
    EmptyUniverse,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Supplies aligned daily close panels for a universe.
pub trait PriceHistoryProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Closes for every asset in `universe` between `start` and `end` inclusive.
    ///
    /// Fails with `DataUnavailable` naming the first asset that has zero history
    /// in the range.
    fn get_price_panel(
        &self,
        universe: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel, DataError>;
}

/// Supplies benchmark index series.
pub trait BenchmarkProvider: Send + Sync {
    fn get_index_series(
        &self,
        index_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, DataError>;
}

/// Provider backed by in-memory series. Used for tests and preloaded data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    assets: BTreeMap<String, Vec<PricePoint>>,
    indices: BTreeMap<String, PriceSeries>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, code: impl Into<String>, points: Vec<PricePoint>) -> Self {
        self.assets.insert(code.into(), points);
        self
    }

    pub fn with_index(mut self, series: PriceSeries) -> Self {
        self.indices.insert(series.code.clone(), series);
        self
    }

    pub fn insert_asset(&mut self, code: impl Into<String>, points: Vec<PricePoint>) {
        self.assets.insert(code.into(), points);
    }

    pub fn insert_index(&mut self, series: PriceSeries) {
        self.indices.insert(series.code.clone(), series);
    }
}

impl PriceHistoryProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn get_price_panel(
        &self,
        universe: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel, DataError> {
        let mut selected = BTreeMap::new();
        for code in universe {
            let points: Vec<PricePoint> = self
                .assets
                .get(code)
                .map(|pts| {
                    pts.iter()
                        .filter(|p| p.date >= start && p.date <= end)
                        .copied()
                        .collect()
                })
                .unwrap_or_default();
            if points.is_empty() {
                return Err(DataError::DataUnavailable { code: code.clone() });
            }
            selected.insert(code.clone(), points);
        }
        Ok(PricePanel::from_points(selected))
    }
}

impl BenchmarkProvider for InMemoryProvider {
    fn get_index_series(
        &self,
        index_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, DataError> {
        let series = self
            .indices
            .get(index_code)
            .ok_or_else(|| DataError::DataUnavailable {
                code: index_code.to_string(),
            })?;
        let bars: Vec<_> = series
            .bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .copied()
            .collect();
        if bars.is_empty() {
            return Err(DataError::DataUnavailable {
                code: index_code.to_string(),
            });
        }
        Ok(PriceSeries::new(index_code, bars))
    }
}
