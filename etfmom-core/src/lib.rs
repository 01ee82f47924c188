//! etfmom core - ETF momentum rotation backtesting engine.
//!
//! This crate contains:
//! - Price data model (aligned close panel, benchmark series) and provider traits
//! - Rolling-window indicators (SMA, ATR, pairwise correlation)
//! - The strategy components: momentum scorer, regime detector, constrained
//!   selector, rotation tracker, drawdown risk manager
//! - The session-by-session simulator and its performance report

pub mod components;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod metrics;
pub mod report;

pub use config::{BacktestConfig, ConfigError, RebalanceFrequency};
pub use engine::{run_backtest, BacktestSimulator, CancellationToken, MarketData, RunError};
pub use report::{AbortReason, DataAnnotation, PerformanceReport, RunStatus};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across sweep threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Data
        require_send::<domain::PricePanel>();
        require_sync::<domain::PricePanel>();
        require_send::<domain::PriceSeries>();
        require_sync::<domain::PriceSeries>();
        require_send::<engine::MarketData>();
        require_sync::<engine::MarketData>();
        require_send::<data::InMemoryProvider>();
        require_sync::<data::InMemoryProvider>();

        // Config and output
        require_send::<config::BacktestConfig>();
        require_sync::<config::BacktestConfig>();
        require_send::<report::PerformanceReport>();
        require_sync::<report::PerformanceReport>();
        require_send::<engine::CancellationToken>();
        require_sync::<engine::CancellationToken>();

        // Components
        require_send::<components::MomentumScorer>();
        require_send::<components::MarketRegimeDetector>();
        require_send::<components::ConstrainedSelector>();
        require_send::<components::RotationTracker>();
        require_send::<components::PortfolioRiskManager>();
        require_send::<engine::BacktestSimulator>();
        require_sync::<engine::BacktestSimulator>();
    }

    /// Architecture contract: the simulator only sees data through the provider traits.
    #[test]
    fn simulator_accepts_trait_objects() {
        use std::sync::Arc;
        let provider = Arc::new(data::InMemoryProvider::new());
        let _sim = BacktestSimulator::new(provider.clone(), provider);
    }
}
