//! Data layer: provider traits, in-memory provider, and time alignment.

pub mod align;
pub mod provider;

pub use align::{align_benchmark, align_closes, BenchmarkTrack};
pub use provider::{BenchmarkProvider, DataError, InMemoryProvider, PriceHistoryProvider};
