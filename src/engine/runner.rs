//! Strategy loops.
//!
//! Arbitrage, swing and phase scaling each run as their own task around the
//! shared ledger. Every loop follows the same shape: run one cycle to
//! completion, then sleep until the next tick or a stop request. A failed
//! cycle is logged and followed by a longer backoff; it never ends the loop.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::engine::accountant::CycleReport;
use crate::engine::executor::Executor;
use crate::engine::ledger::SharedLedger;
use crate::engine::scanner::{mean_price, VenueRouter};
use crate::strategy::{Candidate, ExecutionGate, OpportunityEvaluator, PhaseDecision, ScalingController, SignalEvaluator};
use crate::types::{CloseReason, Pair, Signal, Strategy, TradeGateError, Venue};

/// One periodic task driven by [`run_until_stopped`].
#[async_trait]
pub trait StrategyLoop: Send {
    fn name(&self) -> &'static str;

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<()>;
}

/// Drive `task` until `stop` flips to true (or its sender is dropped). The
/// cycle in progress always completes; the task is handed back at the end.
pub async fn run_until_stopped<T: StrategyLoop>(
    mut task: T,
    interval: Duration,
    backoff: Duration,
    mut stop: watch::Receiver<bool>,
) -> T {
    info!(task = task.name(), interval_secs = interval.as_secs(), "Loop started");

    loop {
        if *stop.borrow() {
            break;
        }

        let pause = match task.run_cycle(Utc::now()).await {
            Ok(()) => interval,
            Err(e) => {
                error!(task = task.name(), error = %e, backoff_secs = backoff.as_secs(), "Cycle failed, backing off");
                backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    info!(task = task.name(), "Loop stopped");
    task
}

/// Mark the pair's open position and close it if a trigger fired.
async fn mark_position(ledger: &SharedLedger, pair: &Pair, price: Decimal, report: &mut CycleReport) {
    let mut ledger = ledger.lock().await;
    if let Some(reason) = ledger.update_price(pair, price).close_reason() {
        if ledger.close(pair, price, reason).is_some() {
            report.triggered_exits += 1;
        }
    }
}

fn ensure_solvent(value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        bail!("portfolio value exhausted ({value})");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Arbitrage
// ---------------------------------------------------------------------------

pub struct ArbitrageLoop {
    ledger: SharedLedger,
    router: Arc<VenueRouter>,
    evaluator: OpportunityEvaluator,
    gate: ExecutionGate,
    executor: Arc<Executor>,
    pairs: Vec<Pair>,
    /// Share of the filled spread booked as realized pnl.
    profit_realization: Decimal,
    cycle: u64,
}

impl ArbitrageLoop {
    pub fn new(
        ledger: SharedLedger,
        router: Arc<VenueRouter>,
        evaluator: OpportunityEvaluator,
        gate: ExecutionGate,
        executor: Arc<Executor>,
        pairs: Vec<Pair>,
        profit_realization: Decimal,
    ) -> Self {
        Self {
            ledger,
            router,
            evaluator,
            gate,
            executor,
            pairs,
            profit_realization,
            cycle: 0,
        }
    }

    /// Scan every pair, gate each candidate, execute the survivors.
    pub async fn scan(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.cycle += 1;
        let mut report = CycleReport::new(Strategy::Arbitrage, self.cycle);
        ensure_solvent(self.ledger.lock().await.portfolio_value())?;
        self.ledger.lock().await.check_daily_rollover(now);

        for pair in &self.pairs {
            let quotes = self.router.quotes(pair).await;
            report.pairs_scanned += 1;

            if let Some(mark) = mean_price(&quotes) {
                mark_position(&self.ledger, pair, mark, &mut report).await;
            }

            let candidates = self.evaluator.evaluate(pair, &quotes, now);
            report.candidates += candidates.len();

            for opp in candidates {
                let trade_id = format!("arb-{}", uuid::Uuid::new_v4());
                self.evaluator.record_candidate(pair, now);
                let amount = {
                    let mut ledger = self.ledger.lock().await;
                    let amount = match self.gate.check(&opp, &ledger, self.evaluator.throttle(), now) {
                        Ok(amount) => amount,
                        Err(rejection) => {
                            info!(%rejection, "Gate rejection");
                            report.rejected += 1;
                            continue;
                        }
                    };
                    if !ledger.open(pair, opp.side(), amount, opp.entry_price(), &trade_id, Strategy::Arbitrage) {
                        report.rejected += 1;
                        continue;
                    }
                    amount
                };

                match self.executor.execute_arbitrage(&opp, amount).await {
                    Ok(fill) => {
                        let exit = fill.buy.price + (fill.sell.price - fill.buy.price) * self.profit_realization;
                        if self.ledger.lock().await.close(pair, exit, CloseReason::Manual).is_some() {
                            report.executed += 1;
                        } else {
                            // Closed elsewhere (a trigger or a stop) while the legs were in flight.
                            warn!(pair = %pair, trade_id = %trade_id, "Arbitrage position already closed at settlement");
                            report.failed += 1;
                        }
                    }
                    Err(TradeGateError::UnhedgedLeg { .. }) => {
                        // The long stays in the ledger; price triggers manage it from here.
                        report.unhedged += 1;
                    }
                    Err(_) => {
                        self.ledger.lock().await.revert_open(pair, &trade_id);
                        report.failed += 1;
                    }
                }
            }
        }

        report.portfolio_value = self.ledger.lock().await.portfolio_value();
        Ok(report)
    }
}

#[async_trait]
impl StrategyLoop for ArbitrageLoop {
    fn name(&self) -> &'static str {
        "arbitrage"
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.scan(now).await?.log();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Swing
// ---------------------------------------------------------------------------

pub struct SwingLoop {
    ledger: SharedLedger,
    router: Arc<VenueRouter>,
    evaluator: SignalEvaluator,
    gate: ExecutionGate,
    executor: Arc<Executor>,
    pairs: Vec<Pair>,
    venue: Venue,
    cycle: u64,
}

impl SwingLoop {
    pub fn new(
        ledger: SharedLedger,
        router: Arc<VenueRouter>,
        evaluator: SignalEvaluator,
        gate: ExecutionGate,
        executor: Arc<Executor>,
        pairs: Vec<Pair>,
        venue: Venue,
    ) -> Self {
        Self {
            ledger,
            router,
            evaluator,
            gate,
            executor,
            pairs,
            venue,
            cycle: 0,
        }
    }

    pub fn evaluator(&self) -> &SignalEvaluator {
        &self.evaluator
    }

    /// Extend each pair's history with the current mean price and act on any
    /// signal it produces.
    pub async fn scan(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.cycle += 1;
        let mut report = CycleReport::new(Strategy::Swing, self.cycle);
        ensure_solvent(self.ledger.lock().await.portfolio_value())?;
        self.ledger.lock().await.check_daily_rollover(now);

        for pair in &self.pairs {
            let quotes = self.router.quotes(pair).await;
            report.pairs_scanned += 1;
            let Some(price) = mean_price(&quotes) else {
                debug!(pair = %pair, "No price this cycle");
                continue;
            };

            mark_position(&self.ledger, pair, price, &mut report).await;
            self.evaluator.observe(pair, price);

            let Some(signal) = self.evaluator.evaluate(pair, price, now) else {
                continue;
            };
            report.candidates += 1;

            // Indicators run on the mean; the entry is priced at the venue that fills it.
            let entry_price = quotes
                .iter()
                .find(|q| q.venue == self.venue)
                .map_or(price, |q| q.price);
            let signal = Signal {
                price: entry_price,
                ..signal
            };

            let trade_id = format!("swing-{}", uuid::Uuid::new_v4());
            let amount = {
                let mut ledger = self.ledger.lock().await;
                let amount = match self.gate.check(&signal, &ledger, self.evaluator.throttle(), now) {
                    Ok(amount) => amount,
                    Err(rejection) => {
                        info!(%rejection, "Gate rejection");
                        report.rejected += 1;
                        continue;
                    }
                };
                if !ledger.open(pair, signal.side(), amount, signal.entry_price(), &trade_id, Strategy::Swing) {
                    report.rejected += 1;
                    continue;
                }
                amount
            };

            match self
                .executor
                .execute_entry(pair, signal.side(), amount, signal.entry_price(), self.venue)
                .await
            {
                Ok(_) => report.executed += 1,
                Err(_) => {
                    self.ledger.lock().await.revert_open(pair, &trade_id);
                    report.failed += 1;
                }
            }
        }

        report.portfolio_value = self.ledger.lock().await.portfolio_value();
        Ok(report)
    }
}

#[async_trait]
impl StrategyLoop for SwingLoop {
    fn name(&self) -> &'static str {
        "swing"
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.scan(now).await?.log();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scaling
// ---------------------------------------------------------------------------

pub struct ScalingLoop {
    ledger: SharedLedger,
    controller: ScalingController,
}

impl ScalingLoop {
    /// Applies the first phase's limits to the ledger straight away.
    pub async fn start(ledger: SharedLedger, controller: ScalingController) -> Self {
        if let Some(phase) = controller.current_phase() {
            ledger
                .lock()
                .await
                .apply_phase_limits(phase.min_trade_notional, phase.max_position_fraction);
        }
        Self { ledger, controller }
    }

    /// One-based phase number.
    pub fn phase_number(&self) -> usize {
        self.controller.current_index() + 1
    }

    pub async fn check(&mut self, now: DateTime<Utc>) -> PhaseDecision {
        let mut ledger = self.ledger.lock().await;
        let m = ledger.metrics();
        let decision = self.controller.evaluate(now, m.win_rate, m.total_return);
        if let (PhaseDecision::Advanced { .. }, Some(phase)) = (&decision, self.controller.current_phase()) {
            ledger.apply_phase_limits(phase.min_trade_notional, phase.max_position_fraction);
        }
        decision
    }
}

#[async_trait]
impl StrategyLoop for ScalingLoop {
    fn name(&self) -> &'static str {
        "scaling"
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<()> {
        let decision = self.check(now).await;
        debug!(phase = self.phase_number(), decision = ?decision, "Scaling check");
        Ok(())
    }
}
