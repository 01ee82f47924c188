//! Session-by-session backtest loop.
//!
//! Each session:
//! 1. Mark holdings to the session close (carry forward when missing)
//! 2. Observe the drawdown ladder on marked equity
//! 3. On rebalance dates: score, classify regime, stop-loss, select, rotate,
//!    cap, pay costs, apply targets
//! 4. Append the equity point
//!
//! A run is a single-threaded fold; all mutable state lives in `BacktestRun`.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::components::{
    ConstrainedSelector, MarketRegimeDetector, MomentumScorer, PlannedExit, PortfolioRiskManager,
    RiskEvent, RotationPlan, RotationState, RotationTracker, ScoreExclusion, SelectionOutcome,
};
use crate::config::{BacktestConfig, ConfigError};
use crate::data::{align_benchmark, BenchmarkProvider, DataError, PriceHistoryProvider};
use crate::domain::{
    LegTarget, Portfolio, PricePanel, PriceSeries, SeriesFault, TradeAction, TradeLogEntry,
    TradeReason,
};
use crate::engine::cancel::CancellationToken;
use crate::engine::schedule::rebalance_flags;
use crate::report::{
    AbortReason, DataAnnotation, EquityPoint, PerformanceReport, RebalanceDiagnostics, RunStatus,
};

/// Failures before the first session is simulated.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("no trading sessions between {start} and {end}")]
    NoSessions { start: NaiveDate, end: NaiveDate },
}

/// Preloaded, immutable inputs shared across runs.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub panel: Arc<PricePanel>,
    pub benchmark: Arc<PriceSeries>,
    /// Notes from loading (e.g. dropped assets), copied into every report.
    pub annotations: Vec<DataAnnotation>,
}

impl MarketData {
    pub fn new(panel: PricePanel, benchmark: PriceSeries) -> Self {
        Self {
            panel: Arc::new(panel),
            benchmark: Arc::new(benchmark),
            annotations: Vec::new(),
        }
    }
}

/// Backtest entry point with injected data providers.
pub struct BacktestSimulator {
    prices: Arc<dyn PriceHistoryProvider>,
    benchmark: Arc<dyn BenchmarkProvider>,
}

impl BacktestSimulator {
    pub fn new(
        prices: Arc<dyn PriceHistoryProvider>,
        benchmark: Arc<dyn BenchmarkProvider>,
    ) -> Self {
        Self { prices, benchmark }
    }

    /// Fetch the panel and benchmark for `config`, including the warmup buffer.
    ///
    /// Assets the provider reports as unavailable are dropped and annotated.
    pub fn load(&self, config: &BacktestConfig) -> Result<MarketData, RunError> {
        let start = config.data_start();
        let mut universe = config.universe.clone();
        let mut annotations = Vec::new();

        let panel = loop {
            if universe.is_empty() {
                return Err(DataError::EmptyUniverse.into());
            }
            match self.prices.get_price_panel(&universe, start, config.end) {
                Ok(panel) => break panel,
                Err(DataError::DataUnavailable { code }) if universe.contains(&code) => {
                    warn!(
                        code = %code,
                        provider = self.prices.name(),
                        "asset unavailable, dropping"
                    );
                    universe.retain(|c| c != &code);
                    annotations.push(DataAnnotation::AssetUnavailable { code });
                }
                Err(e) => return Err(e.into()),
            }
        };

        let benchmark = self
            .benchmark
            .get_index_series(&config.benchmark, start, config.end)?;

        Ok(MarketData {
            panel: Arc::new(panel),
            benchmark: Arc::new(benchmark),
            annotations,
        })
    }

    /// Load and run with a fresh cancellation token.
    pub fn run(&self, config: BacktestConfig) -> Result<PerformanceReport, RunError> {
        config.validate()?;
        let data = self.load(&config)?;
        Self::run_with_data(config, &data, &CancellationToken::new())
    }

    /// Run on preloaded data. No I/O.
    pub fn run_with_data(
        config: BacktestConfig,
        data: &MarketData,
        cancel: &CancellationToken,
    ) -> Result<PerformanceReport, RunError> {
        let run = BacktestRun::new(config, data)?;
        Ok(run.execute(cancel))
    }
}

/// Convenience wrapper: construct a simulator and run once.
pub fn run_backtest(
    config: BacktestConfig,
    prices: Arc<dyn PriceHistoryProvider>,
    benchmark: Arc<dyn BenchmarkProvider>,
) -> Result<PerformanceReport, RunError> {
    BacktestSimulator::new(prices, benchmark).run(config)
}

// ─── Run context ────────────────────────────────────────────────────

/// All state owned by one run.
struct BacktestRun<'a> {
    config: BacktestConfig,
    run_id: String,
    panel: &'a PricePanel,
    universe: Vec<String>,
    start_idx: usize,
    end_idx: usize,
    /// First session that may not be simulated because the benchmark is corrupt.
    fault: Option<(usize, SeriesFault)>,

    scorer: MomentumScorer,
    detector: MarketRegimeDetector,
    selector: ConstrainedSelector,
    rotation: RotationTracker,
    risk: PortfolioRiskManager,
    portfolio: Portfolio,

    status: RunStatus,
    equity_curve: Vec<EquityPoint>,
    trade_log: Vec<TradeLogEntry>,
    risk_events: Vec<RiskEvent>,
    diagnostics: Vec<RebalanceDiagnostics>,
    annotations: Vec<DataAnnotation>,
    history_noted: BTreeSet<String>,
}

impl<'a> BacktestRun<'a> {
    fn new(config: BacktestConfig, data: &'a MarketData) -> Result<Self, RunError> {
        config.validate()?;
        let panel = data.panel.as_ref();
        let mut annotations = data.annotations.clone();

        let mut universe = Vec::new();
        for code in &config.universe {
            if panel.contains(code) {
                universe.push(code.clone());
            } else if !annotations
                .iter()
                .any(|a| matches!(a, DataAnnotation::AssetUnavailable { code: c } if c == code))
            {
                annotations.push(DataAnnotation::AssetUnavailable { code: code.clone() });
            }
        }
        if universe.is_empty() {
            return Err(DataError::EmptyUniverse.into());
        }

        let no_sessions = || RunError::NoSessions {
            start: config.start,
            end: config.end,
        };
        let start_idx = panel.index_at_or_after(config.start);
        let end_idx = panel
            .index_at_or_before(config.end)
            .ok_or_else(no_sessions)?;
        if start_idx > end_idx {
            return Err(no_sessions());
        }

        let fault = data.benchmark.first_fault().map(|(date, fault)| {
            annotations.push(DataAnnotation::BenchmarkFault { date, fault });
            (panel.index_at_or_after(date), fault)
        });
        let track = align_benchmark(panel.dates(), &data.benchmark.usable_prefix());
        let run_end = fault.map_or(end_idx + 1, |(i, _)| i.min(end_idx + 1));
        let carried = track.carried[start_idx.min(run_end)..run_end]
            .iter()
            .filter(|c| **c)
            .count();
        if carried > 0 {
            annotations.push(DataAnnotation::BenchmarkCarriedForward { sessions: carried });
        }

        Ok(Self {
            run_id: config.run_id(),
            scorer: MomentumScorer::new(config.momentum.windows.clone()),
            detector: MarketRegimeDetector::new(
                config.regime.clone(),
                config.rotation.stop_loss,
                &track,
            ),
            selector: ConstrainedSelector::new(config.selection.clone()),
            rotation: RotationTracker::new(config.rotation.clone()),
            risk: PortfolioRiskManager::new(&config.risk, config.initial_capital),
            portfolio: Portfolio::new(config.initial_capital),
            panel,
            universe,
            start_idx,
            end_idx,
            fault,
            status: RunStatus::Initialized,
            equity_curve: Vec::new(),
            trade_log: Vec::new(),
            risk_events: Vec::new(),
            diagnostics: Vec::new(),
            annotations,
            history_noted: BTreeSet::new(),
            config,
        })
    }

    fn execute(mut self, cancel: &CancellationToken) -> PerformanceReport {
        let dates = self.panel.dates();
        let flags = rebalance_flags(dates, self.start_idx, self.end_idx, self.config.rebalance);
        info!(
            run_id = %self.run_id,
            assets = self.universe.len(),
            sessions = flags.len(),
            start = %dates[self.start_idx],
            end = %dates[self.end_idx],
            "backtest started"
        );
        self.status = RunStatus::Running;

        for t in self.start_idx..=self.end_idx {
            let date = dates[t];

            if let Some((fault_idx, fault)) = self.fault {
                if t >= fault_idx {
                    warn!(%date, %fault, "benchmark corrupt, aborting run");
                    self.status = RunStatus::Aborted {
                        date,
                        reason: AbortReason::BenchmarkCorrupt { fault },
                    };
                    break;
                }
            }

            self.mark(t, date);

            if let Some(event) = self.risk.observe(date, self.portfolio.equity) {
                info!(
                    %date,
                    from = %event.from,
                    to = %event.to,
                    drawdown = event.drawdown,
                    "risk level changed"
                );
                self.risk_events.push(event);
            }

            if flags[t - self.start_idx] {
                if cancel.is_cancelled() {
                    warn!(%date, "run cancelled");
                    self.status = RunStatus::Aborted {
                        date,
                        reason: AbortReason::Cancelled,
                    };
                    break;
                }
                self.rebalance(t, date);
            }

            self.equity_curve.push(EquityPoint {
                date,
                equity: self.portfolio.equity,
                cash_weight: self.portfolio.cash_weight(),
                satellite_weight: self.portfolio.satellite_weight(),
                risk_level: self.risk.level(),
            });
        }

        if self.status == RunStatus::Running {
            self.status = RunStatus::Completed;
        }

        let report = PerformanceReport::assemble(
            self.status,
            self.run_id,
            self.equity_curve,
            self.trade_log,
            self.risk_events,
            self.diagnostics,
            self.annotations,
            self.config.initial_capital,
            self.config.risk_free_rate,
        );
        info!(
            run_id = %report.run_id,
            status = ?report.status,
            sessions = report.trading_days,
            cumulative_return = report.cumulative_return,
            "backtest finished"
        );
        report
    }

    /// Revalue every holding at session `t`.
    fn mark(&mut self, t: usize, date: NaiveDate) {
        let codes: Vec<String> = self.portfolio.holdings.keys().cloned().collect();
        for code in codes {
            match self.panel.close_at(&code, t) {
                Some(price) => self.portfolio.mark(&code, price, false),
                None => {
                    let Some((from, price)) = self.panel.last_close_at_or_before(&code, t) else {
                        continue;
                    };
                    let carried_from = self.panel.dates()[from];
                    warn!(code = %code, %date, %carried_from, "stale price carried forward");
                    self.annotations.push(DataAnnotation::StalePrice {
                        code: code.clone(),
                        date,
                        carried_from,
                    });
                    self.portfolio.mark(&code, price, true);
                }
            }
        }
        self.portfolio.refresh();
    }

    fn rebalance(&mut self, t: usize, date: NaiveDate) {
        let snapshot = self.scorer.score(self.panel, &self.universe, t);
        self.note_exclusions(date, &snapshot.excluded);

        let candidates = snapshot.candidates();
        let regime = self.detector.evaluate(t, date, &candidates);

        // Degenerate cross-section: record and leave the book untouched.
        if snapshot.is_degenerate() {
            let selection =
                self.selector
                    .select(&snapshot, regime.max_legs, self.panel, t, &BTreeSet::new());
            debug!(%date, scored = snapshot.scored_count, "cross-section too thin, no trades");
            self.diagnostics.push(RebalanceDiagnostics {
                date,
                regime,
                selection,
                excluded: snapshot.excluded,
                stopped_out: Vec::new(),
                rotation: Vec::new(),
                risk_level: self.risk.level(),
                risk_scale: 1.0,
                turnover: 0.0,
                cost: 0.0,
                skipped: true,
            });
            return;
        }

        let stopped: BTreeSet<String> = self
            .portfolio
            .holdings
            .values()
            .filter(|h| h.return_since_entry() <= -regime.stop_loss)
            .map(|h| h.code.clone())
            .collect();

        let selection = self
            .selector
            .select(&snapshot, regime.max_legs, self.panel, t, &stopped);

        let plan = if selection.outcome == SelectionOutcome::NoQualifiedCandidates {
            liquidation_plan(&self.portfolio, &stopped)
        } else {
            self.rotation
                .reconcile(&self.portfolio, &selection, regime.min_holding_multiplier, &stopped)
        };

        // Membership is fixed; now size and cap.
        let gross = plan.legs.len() as f64 * regime.leg_exposure;
        let scale = self.risk.scale(gross);
        let weight = regime.leg_exposure * scale;

        // Only assets that printed today are bought or topped up. A holding
        // with a carried-forward price may be trimmed but never grown.
        let mut targets = Vec::with_capacity(plan.legs.len());
        for leg in &plan.legs {
            let target = match self.panel.close_at(&leg.code, t) {
                Some(price) => Some((weight, price)),
                None => self.portfolio.holdings.get(&leg.code).map(|h| {
                    debug!(code = %leg.code, %date, "no print today, holding not topped up");
                    (h.weight.min(weight), h.last_price)
                }),
            };
            if let Some((weight, price)) = target {
                targets.push(LegTarget {
                    code: leg.code.clone(),
                    weight,
                    price,
                });
            }
        }

        let turnover = self.turnover(&targets);
        let cost = turnover * self.config.costs.total_rate() * self.portfolio.equity;

        self.log_trades(date, &stopped, &plan, &targets, scale);
        self.portfolio.rebalance(date, &targets, cost);
        for leg in &plan.legs {
            if let Some(h) = self.portfolio.holdings.get_mut(&leg.code) {
                h.observation_counter = leg.state.counter();
            }
        }

        let selected = selection.codes();
        let held: Vec<&String> = self.portfolio.holdings.keys().collect();
        debug!(
            %date,
            trend = ?regime.trend,
            chop = regime.chop,
            max_legs = regime.max_legs,
            ?selected,
            ?held,
            turnover,
            "rebalanced"
        );

        self.diagnostics.push(RebalanceDiagnostics {
            date,
            regime,
            selection,
            excluded: snapshot.excluded,
            stopped_out: stopped.into_iter().collect(),
            rotation: plan.transitions,
            risk_level: self.risk.level(),
            risk_scale: scale,
            turnover,
            cost,
            skipped: false,
        });
    }

    /// Σ |target − drifted weight| over the satellite sleeve.
    fn turnover(&self, targets: &[LegTarget]) -> f64 {
        let mut total: f64 = targets
            .iter()
            .map(|t| (t.weight - self.portfolio.weight_of(&t.code)).abs())
            .sum();
        for (code, h) in &self.portfolio.holdings {
            if !targets.iter().any(|t| &t.code == code) {
                total += h.weight;
            }
        }
        total
    }

    fn log_trades(
        &mut self,
        date: NaiveDate,
        stopped: &BTreeSet<String>,
        plan: &RotationPlan,
        targets: &[LegTarget],
        scale: f64,
    ) {
        let entry = |action: TradeAction,
                     code: &str,
                     before: f64,
                     after: f64,
                     reason: TradeReason| TradeLogEntry {
            date,
            action,
            code: code.to_string(),
            weight_before: before,
            weight_after: after,
            reason,
        };
        let mut log = Vec::new();

        for code in stopped {
            let before = self.portfolio.weight_of(code);
            log.push(entry(TradeAction::Sell, code, before, 0.0, TradeReason::StopLoss));
        }
        for exit in &plan.exits {
            let before = self.portfolio.weight_of(&exit.code);
            log.push(entry(TradeAction::Sell, &exit.code, before, 0.0, exit.reason));
        }
        for leg in &plan.legs {
            let Some(target) = targets.iter().find(|t| t.code == leg.code) else {
                continue;
            };
            let before = self.portfolio.weight_of(&leg.code);
            log.push(if leg.is_new {
                entry(TradeAction::Buy, &leg.code, before, target.weight, TradeReason::Momentum)
            } else {
                let reason = if scale < 1.0 {
                    TradeReason::RiskCap
                } else if matches!(leg.state, RotationState::Observing(_)) {
                    TradeReason::Rotation
                } else {
                    TradeReason::Momentum
                };
                entry(TradeAction::Hold, &leg.code, before, target.weight, reason)
            });
        }

        self.trade_log.extend(log);
    }

    /// Record the first date each asset was excluded for lack of history.
    fn note_exclusions(&mut self, date: NaiveDate, excluded: &[(String, ScoreExclusion)]) {
        for (code, reason) in excluded {
            if let ScoreExclusion::InsufficientHistory {
                required,
                available,
            } = reason
            {
                if self.history_noted.insert(code.clone()) {
                    self.annotations.push(DataAnnotation::InsufficientHistory {
                        code: code.clone(),
                        date,
                        required: *required,
                        available: *available,
                    });
                }
            }
        }
    }
}

/// Nothing meets the momentum floor: every remaining holding is sold.
fn liquidation_plan(portfolio: &Portfolio, stopped: &BTreeSet<String>) -> RotationPlan {
    RotationPlan {
        legs: Vec::new(),
        exits: portfolio
            .holdings
            .keys()
            .filter(|c| !stopped.contains(*c))
            .map(|code| PlannedExit {
                code: code.clone(),
                reason: TradeReason::Momentum,
            })
            .collect(),
        transitions: Vec::new(),
    }
}
