//! Portfolio ledger.
//!
//! Owns portfolio value, open positions, realized pnl and drawdown, and is
//! the only place any of them change. Both strategy loops reach it through a
//! [`SharedLedger`] handle and hold the lock for the whole of each mutation,
//! so two loops can never open the same pair or double-count a close.
//!
//! Implements:
//! - Confidence-scaled position sizing with a notional floor
//! - Ordered open checks (daily-loss circuit breaker, one position per pair,
//!   position limit, reserve buffer)
//! - Stop-loss / take-profit detection on price ticks
//! - Peak and max-drawdown tracking on every close
//! - Best-effort emergency liquidation
//! - UTC calendar-day rollover of daily pnl and trade count

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::types::{
    ClosedPosition, CloseReason, GateResult, Pair, Position, PriceTrigger, Side, Strategy,
    TradeGateError,
};

/// Handle shared by the strategy loops.
pub type SharedLedger = Arc<Mutex<PortfolioLedger>>;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Risk limits the ledger enforces. The scaling controller may replace the
/// sizing pair (`min_trade_notional`, `max_position_fraction`) at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerLimits {
    pub min_trade_notional: Decimal,
    pub max_position_fraction: Decimal,
    pub max_daily_loss: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub reserve_fraction: Decimal,
}

impl From<&RiskConfig> for LedgerLimits {
    fn from(r: &RiskConfig) -> Self {
        Self {
            min_trade_notional: r.min_trade_size,
            max_position_fraction: r.max_position_size,
            max_daily_loss: r.max_daily_loss,
            stop_loss: r.stop_loss_percentage,
            take_profit: r.take_profit_percentage,
            reserve_fraction: r.reserve_fraction,
        }
    }
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self::from(&RiskConfig::default())
    }
}

/// First check that blocked an open.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitBreach {
    CircuitBreaker { daily_pnl: Decimal, limit: Decimal },
    InvalidOrder { amount: Decimal, price: Decimal },
    PositionExists(Pair),
    PositionLimit { notional: Decimal, limit: Decimal },
    ReserveBuffer { notional: Decimal, limit: Decimal },
}

impl fmt::Display for LimitBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitBreach::CircuitBreaker { daily_pnl, limit } => {
                write!(f, "daily loss circuit breaker (pnl {daily_pnl:.2} <= -{limit:.2})")
            }
            LimitBreach::InvalidOrder { amount, price } => {
                write!(f, "invalid order (amount {amount}, price {price})")
            }
            LimitBreach::PositionExists(pair) => write!(f, "position already open for {pair}"),
            LimitBreach::PositionLimit { notional, limit } => {
                write!(f, "notional {notional:.2} exceeds position limit {limit:.2}")
            }
            LimitBreach::ReserveBuffer { notional, limit } => {
                write!(f, "notional {notional:.2} exceeds reserve buffer {limit:.2}")
            }
        }
    }
}

/// Derived portfolio figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub portfolio_value: Decimal,
    pub initial_value: Decimal,
    pub peak_value: Decimal,
    pub total_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub daily_trades: u32,
    pub max_drawdown: Decimal,
    pub open_positions: usize,
    pub total_closed: usize,
    pub winning_closed: usize,
    /// Fraction of closed positions with positive pnl; zero when none closed.
    pub win_rate: Decimal,
    /// `(value - initial) / initial`.
    pub total_return: Decimal,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PortfolioLedger {
    limits: LedgerLimits,
    initial_value: Decimal,
    portfolio_value: Decimal,
    peak_value: Decimal,
    max_drawdown: Decimal,
    total_pnl: Decimal,
    daily_pnl: Decimal,
    daily_trades: u32,
    total_opened: u64,
    day_start: NaiveDate,
    positions: HashMap<Pair, Position>,
    closed: Vec<ClosedPosition>,
}

impl PortfolioLedger {
    pub fn new(limits: LedgerLimits, initial_value: Decimal) -> Self {
        Self::starting_at(limits, initial_value, Utc::now())
    }

    /// Ledger whose first trading day is the UTC date of `now`.
    pub fn starting_at(limits: LedgerLimits, initial_value: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            initial_value,
            portfolio_value: initial_value,
            peak_value: initial_value,
            max_drawdown: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            daily_trades: 0,
            total_opened: 0,
            day_start: now.date_naive(),
            positions: HashMap::new(),
            closed: Vec::new(),
        }
    }

    /// Wrap in the handle the strategy loops share.
    pub fn into_shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    /// Seed the starting value. Refused once any position has been opened.
    pub fn set_initial_value(&mut self, value: Decimal) -> GateResult<()> {
        if self.total_opened > 0 {
            return Err(TradeGateError::Ledger(
                "initial value cannot change after a position has opened".into(),
            ));
        }
        if value <= Decimal::ZERO {
            return Err(TradeGateError::Ledger(format!(
                "initial value must be positive, got {value}"
            )));
        }
        self.initial_value = value;
        self.portfolio_value = value;
        self.peak_value = value;
        self.max_drawdown = Decimal::ZERO;
        info!(value = %value, "Portfolio seeded");
        Ok(())
    }

    /// Replace the sizing limits (phase escalation).
    pub fn apply_phase_limits(&mut self, min_trade_notional: Decimal, max_position_fraction: Decimal) {
        self.limits.min_trade_notional = min_trade_notional;
        self.limits.max_position_fraction = max_position_fraction;
    }

    pub fn limits(&self) -> &LedgerLimits {
        &self.limits
    }

    // -- Sizing and checks ----------------------------------------------

    /// Amount of base asset to trade: the larger of the minimum notional and
    /// the confidence-scaled position limit, converted at `price`.
    pub fn size_position(&self, pair: &Pair, price: Decimal, confidence: Decimal) -> Decimal {
        if price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let confidence = confidence.clamp(Decimal::ZERO, Decimal::ONE);
        let scaled = self.portfolio_value * self.limits.max_position_fraction * confidence;
        let notional = scaled.max(self.limits.min_trade_notional);
        let amount = notional / price;
        debug!(pair = %pair, notional = %notional.round_dp(2), amount = %amount.round_dp(8), "Sized position");
        amount
    }

    /// Ordered open checks. The first failing check is returned.
    pub fn check_open(&self, pair: &Pair, amount: Decimal, price: Decimal) -> Result<(), LimitBreach> {
        let loss_limit = self.portfolio_value * self.limits.max_daily_loss;
        if self.daily_pnl <= -loss_limit {
            return Err(LimitBreach::CircuitBreaker {
                daily_pnl: self.daily_pnl,
                limit: loss_limit,
            });
        }
        if amount <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(LimitBreach::InvalidOrder { amount, price });
        }
        if self.positions.contains_key(pair) {
            return Err(LimitBreach::PositionExists(pair.clone()));
        }

        let notional = amount * price;
        let position_limit = self.portfolio_value * self.limits.max_position_fraction;
        if notional > position_limit {
            return Err(LimitBreach::PositionLimit {
                notional,
                limit: position_limit,
            });
        }
        let reserve_limit = self.portfolio_value * self.limits.reserve_fraction;
        if notional > reserve_limit {
            return Err(LimitBreach::ReserveBuffer {
                notional,
                limit: reserve_limit,
            });
        }
        Ok(())
    }

    pub fn can_open(&self, pair: &Pair, _side: Side, amount: Decimal, price: Decimal) -> bool {
        self.check_open(pair, amount, price).is_ok()
    }

    // -- Lifecycle ------------------------------------------------------

    /// Open a position after re-running the open checks. Returns false and
    /// changes nothing when a check fails.
    pub fn open(
        &mut self,
        pair: &Pair,
        side: Side,
        amount: Decimal,
        price: Decimal,
        trade_id: &str,
        strategy: Strategy,
    ) -> bool {
        if let Err(breach) = self.check_open(pair, amount, price) {
            warn!(pair = %pair, reason = %breach, "Open refused");
            return false;
        }

        self.positions.insert(
            pair.clone(),
            Position {
                trade_id: trade_id.to_string(),
                pair: pair.clone(),
                side,
                strategy,
                amount,
                entry_price: price,
                current_price: price,
                unrealized_pnl: Decimal::ZERO,
                opened_at: Utc::now(),
            },
        );
        self.daily_trades += 1;
        self.total_opened += 1;

        info!(
            pair = %pair,
            side = %side,
            strategy = %strategy,
            amount = %amount.round_dp(8),
            price = %price,
            trade_id,
            "Position opened"
        );
        true
    }

    /// Undo an open whose execution never filled. Only removes the position
    /// if `trade_id` still matches; no pnl is booked.
    pub fn revert_open(&mut self, pair: &Pair, trade_id: &str) -> bool {
        match self.positions.get(pair) {
            Some(p) if p.trade_id == trade_id => {
                self.positions.remove(pair);
                self.daily_trades = self.daily_trades.saturating_sub(1);
                info!(pair = %pair, trade_id, "Open reverted after failed execution");
                true
            }
            _ => false,
        }
    }

    /// Mark the pair's position to `price` and report a triggered exit.
    /// The caller closes the position when a trigger fires.
    pub fn update_price(&mut self, pair: &Pair, price: Decimal) -> PriceTrigger {
        let Some(position) = self.positions.get_mut(pair) else {
            return PriceTrigger::None;
        };
        position.current_price = price;
        position.unrealized_pnl = position.pnl_at(price);

        let basis = position.cost_basis();
        if basis <= Decimal::ZERO {
            return PriceTrigger::None;
        }
        let pnl = position.unrealized_pnl;
        if pnl < Decimal::ZERO && -pnl / basis >= self.limits.stop_loss {
            debug!(pair = %pair, pnl = %pnl.round_dp(2), "Stop-loss triggered");
            PriceTrigger::StopLoss
        } else if pnl > Decimal::ZERO && pnl / basis >= self.limits.take_profit {
            debug!(pair = %pair, pnl = %pnl.round_dp(2), "Take-profit triggered");
            PriceTrigger::TakeProfit
        } else {
            PriceTrigger::None
        }
    }

    /// Close the pair's position at `price`. Returns the realized pnl, or
    /// `None` when the pair has no open position.
    pub fn close(&mut self, pair: &Pair, price: Decimal, reason: CloseReason) -> Option<Decimal> {
        let position = self.positions.remove(pair)?;
        let pnl = position.pnl_at(price);

        self.total_pnl += pnl;
        self.daily_pnl += pnl;
        self.portfolio_value += pnl;

        if self.portfolio_value > self.peak_value {
            self.peak_value = self.portfolio_value;
        }
        if self.peak_value > Decimal::ZERO {
            let drawdown = (self.peak_value - self.portfolio_value) / self.peak_value;
            self.max_drawdown = self.max_drawdown.max(drawdown);
        }

        info!(
            pair = %pair,
            side = %position.side,
            reason = %reason,
            entry = %position.entry_price,
            exit = %price,
            pnl = %pnl.round_dp(2),
            portfolio = %self.portfolio_value.round_dp(2),
            "Position closed"
        );

        self.closed.push(ClosedPosition {
            position,
            exit_price: price,
            realized_pnl: pnl,
            reason,
            closed_at: Utc::now(),
        });
        Some(pnl)
    }

    /// Close every open position at its last marked price. One position
    /// failing to close does not stop the rest.
    pub fn emergency_stop(&mut self) -> Vec<(Pair, Decimal)> {
        let marks: Vec<(Pair, Decimal)> = self
            .positions
            .values()
            .map(|p| (p.pair.clone(), p.current_price))
            .collect();

        warn!(open = marks.len(), "Emergency stop: closing all positions");

        let mut closed = Vec::with_capacity(marks.len());
        for (pair, price) in marks {
            match self.close(&pair, price, CloseReason::EmergencyStop) {
                Some(pnl) => closed.push((pair, pnl)),
                None => warn!(pair = %pair, "Emergency close skipped, position already gone"),
            }
        }
        closed
    }

    /// Reset daily pnl and trade count when `now` is on a later UTC date
    /// than the current trading day. Returns true when a rollover happened.
    pub fn check_daily_rollover(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if today <= self.day_start {
            return false;
        }
        info!(
            previous_day = %self.day_start,
            daily_pnl = %self.daily_pnl.round_dp(2),
            daily_trades = self.daily_trades,
            "Daily rollover"
        );
        self.daily_pnl = Decimal::ZERO;
        self.daily_trades = 0;
        self.day_start = today;
        true
    }

    // -- Accessors ------------------------------------------------------

    pub fn metrics(&self) -> RiskMetrics {
        let total_closed = self.closed.len();
        let winning_closed = self.closed.iter().filter(|c| c.is_winner()).count();
        let win_rate = if total_closed == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(winning_closed) / Decimal::from(total_closed)
        };

        RiskMetrics {
            portfolio_value: self.portfolio_value,
            initial_value: self.initial_value,
            peak_value: self.peak_value,
            total_pnl: self.total_pnl,
            daily_pnl: self.daily_pnl,
            daily_trades: self.daily_trades,
            max_drawdown: self.max_drawdown,
            open_positions: self.positions.len(),
            total_closed,
            winning_closed,
            win_rate,
            total_return: self.total_return(),
        }
    }

    pub fn total_return(&self) -> Decimal {
        if self.initial_value.is_zero() {
            return Decimal::ZERO;
        }
        (self.portfolio_value - self.initial_value) / self.initial_value
    }

    pub fn portfolio_value(&self) -> Decimal {
        self.portfolio_value
    }

    pub fn initial_value(&self) -> Decimal {
        self.initial_value
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.max_drawdown
    }

    pub fn position(&self, pair: &Pair) -> Option<&Position> {
        self.positions.get(pair)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn closed_positions(&self) -> &[ClosedPosition] {
        &self.closed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
