//! Domain types for etfmom

pub mod portfolio;
pub mod price;
pub mod trade;

pub use portfolio::{Holding, LegTarget, Portfolio};
pub use price::{PriceBar, PricePanel, PricePoint, PriceSeries, SeriesFault};
pub use trade::{TradeAction, TradeLogEntry, TradeReason};
