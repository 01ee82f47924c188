//! Backtest engine - rebalance calendar, cancellation, and the session loop.
//!
//! The simulator consumes a preloaded `PricePanel` and benchmark series and
//! folds over the run's sessions:
//!
//! 1. Mark-to-market and drawdown observation every session
//! 2. Momentum, regime, stop-loss, selection, rotation and risk cap on rebalance dates
//! 3. Turnover costs deducted before targets are applied

pub mod cancel;
pub mod schedule;
pub mod simulator;

pub use cancel::CancellationToken;
pub use schedule::rebalance_flags;
pub use simulator::{run_backtest, BacktestSimulator, MarketData, RunError};
