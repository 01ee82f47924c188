//! The strategy components, leaf-first.
//!
//! Per rebalance date the simulator drives them in a fixed order:
//! - `MomentumScorer`: blended returns and cross-sectional percentiles
//! - `MarketRegimeDetector`: bounds leg count and exposure from the benchmark
//!   (the dispersion vote reads the scored candidates)
//! - `ConstrainedSelector`: momentum floor plus correlation-aware admission
//! - `RotationTracker`: reconciles the selection against current holdings
//! - `PortfolioRiskManager`: scales the sleeve down under drawdown

pub mod momentum;
pub mod regime;
pub mod risk;
pub mod rotation;
pub mod selector;

pub use momentum::{
    percentile_ranks, Candidate, MomentumRecord, MomentumScorer, MomentumSnapshot, ScoreExclusion,
};
pub use regime::{ChopVotes, MarketRegimeDetector, RegimeState, Trend, TrendGate};
pub use risk::{PortfolioRiskManager, RiskEvent, RiskEventKind, RiskLevel};
pub use rotation::{
    CounterTransition, PlannedExit, PlannedLeg, RotationPlan, RotationState, RotationTracker,
};
pub use selector::{
    CandidateDiagnostic, ConstrainedSelector, CorrelationMatrix, Selection, SelectionDiagnostic,
    SelectionOutcome,
};
