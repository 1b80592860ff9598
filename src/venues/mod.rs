//! External collaborators.
//!
//! Defines the `PriceSource` and `TradeExecutor` traits the engine talks to,
//! and provides:
//! - `rest`: public REST ticker sources (Binance, Coinbase, Kraken, CoinGecko)
//! - `PaperExecutor`: simulated fills, the only executor shipped
//!
//! Every call returns an explicit error kind: a price source failure is
//! `DataUnavailable`, an executor failure is `Execution`.

pub mod rest;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::info;

use crate::types::{GateResult, OrderSide, Pair, TradeGateError, TradeReceipt, Venue, VenueQuote};

/// One venue's view of pair prices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current quote for `pair`. Unreachable, unsupported and timed-out
    /// requests are all `DataUnavailable`.
    async fn quote(&self, pair: &Pair) -> GateResult<VenueQuote>;

    /// Venue this source reports for.
    fn venue(&self) -> Venue;
}

/// Places single orders on a venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        venue: Venue,
    ) -> GateResult<TradeReceipt>;
}

// ---------------------------------------------------------------------------
// Paper executor
// ---------------------------------------------------------------------------

/// Fills every order at the requested price without touching a venue.
#[derive(Debug, Default, Clone)]
pub struct PaperExecutor {
    failing: HashSet<Venue>,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every order sent to `venue`.
    pub fn with_failing_venue(mut self, venue: Venue) -> Self {
        self.failing.insert(venue);
        self
    }
}

#[async_trait]
impl TradeExecutor for PaperExecutor {
    async fn execute(
        &self,
        pair: &Pair,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        venue: Venue,
    ) -> GateResult<TradeReceipt> {
        if self.failing.contains(&venue) {
            return Err(TradeGateError::Execution {
                venue,
                message: "paper venue configured to reject orders".into(),
            });
        }

        let receipt = TradeReceipt::paper(venue, pair, side, amount, price);
        info!(
            pair = %pair,
            venue = %venue,
            side = %side,
            amount = %amount.round_dp(8),
            price = %price,
            trade_id = %receipt.trade_id,
            "[PAPER] Order filled"
        );
        Ok(receipt)
    }
}
