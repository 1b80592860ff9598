//! Accountant: per-cycle reports and the end-of-run summary.
//!
//! Each strategy cycle produces a `CycleReport` for the log. When the run
//! stops, `Accountant::summarize` turns the ledger into the one JSON record
//! the run leaves behind.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::ledger::PortfolioLedger;
use crate::types::{ClosedPosition, Strategy};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Outcome of one scan→evaluate→execute pass of a strategy loop.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub strategy: Strategy,
    pub cycle_number: u64,
    pub pairs_scanned: usize,
    pub candidates: usize,
    pub rejected: usize,
    pub executed: usize,
    pub failed: usize,
    pub unhedged: usize,
    /// Positions closed by stop-loss or take-profit this cycle.
    pub triggered_exits: usize,
    pub portfolio_value: Decimal,
}

impl CycleReport {
    pub fn new(strategy: Strategy, cycle_number: u64) -> Self {
        Self {
            strategy,
            cycle_number,
            pairs_scanned: 0,
            candidates: 0,
            rejected: 0,
            executed: 0,
            failed: 0,
            unhedged: 0,
            triggered_exits: 0,
            portfolio_value: Decimal::ZERO,
        }
    }

    pub fn log(&self) {
        info!(
            strategy = %self.strategy,
            cycle = self.cycle_number,
            pairs = self.pairs_scanned,
            candidates = self.candidates,
            rejected = self.rejected,
            executed = self.executed,
            failed = self.failed,
            unhedged = self.unhedged,
            exits = self.triggered_exits,
            portfolio = format!("${:.2}", self.portfolio_value),
            "Cycle complete"
        );
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// The JSON record written once at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub final_portfolio_value: Decimal,
    pub initial_portfolio_value: Decimal,
    pub total_return: Decimal,
    pub total_return_pct: Decimal,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate: Decimal,
    pub daily_pnl: Decimal,
    pub max_drawdown: Decimal,
    /// One-based phase the run finished in.
    pub final_phase: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub trades: Vec<ClosedPosition>,
}

pub struct Accountant;

impl Accountant {
    /// Build the run summary from the ledger's final state.
    pub fn summarize(
        ledger: &PortfolioLedger,
        final_phase: usize,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> RunSummary {
        let m = ledger.metrics();
        let trades = ledger.closed_positions().to_vec();

        let summary = RunSummary {
            final_portfolio_value: m.portfolio_value,
            initial_portfolio_value: m.initial_value,
            total_return: m.portfolio_value - m.initial_value,
            total_return_pct: (m.total_return * Decimal::ONE_HUNDRED).round_dp(4),
            total_trades: trades.len(),
            winning_trades: m.winning_closed,
            win_rate: m.win_rate,
            daily_pnl: m.daily_pnl,
            max_drawdown: m.max_drawdown,
            final_phase,
            started_at,
            ended_at,
            trades,
        };

        info!(
            value = format!("${:.2}", summary.final_portfolio_value),
            return_pct = format!("{:.2}%", summary.total_return_pct),
            trades = summary.total_trades,
            win_rate = format!("{:.1}%", summary.win_rate * Decimal::ONE_HUNDRED),
            max_drawdown = format!("{:.2}%", summary.max_drawdown * Decimal::ONE_HUNDRED),
            "Run summary"
        );
        summary
    }
}
