//! Trade executor.
//!
//! Sends approved candidates to the execution collaborator. Swing entries
//! are a single order; arbitrage is two legs, buy then sell. A sell leg that
//! fails after the buy filled leaves real exposure behind and is reported as
//! an unhedged leg rather than an ordinary failure.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::types::{GateResult, OrderSide, Opportunity, Pair, Side, TradeGateError, TradeReceipt, Venue};
use crate::venues::TradeExecutor;

/// Both legs of a completed arbitrage.
#[derive(Debug, Clone)]
pub struct ArbitrageFill {
    pub buy: TradeReceipt,
    pub sell: TradeReceipt,
}

impl ArbitrageFill {
    /// Quote-currency gain before fees.
    pub fn gross_profit(&self) -> Decimal {
        (self.sell.price - self.buy.price) * self.buy.amount
    }
}

pub struct Executor {
    venue: Arc<dyn TradeExecutor>,
}

impl Executor {
    pub fn new(venue: Arc<dyn TradeExecutor>) -> Self {
        Self { venue }
    }

    /// Open a directional position with one order.
    pub async fn execute_entry(
        &self,
        pair: &Pair,
        side: Side,
        amount: Decimal,
        price: Decimal,
        venue: Venue,
    ) -> GateResult<TradeReceipt> {
        let order = side.entry_order();
        match self.venue.execute(pair, order, amount, price, venue).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                warn!(pair = %pair, venue = %venue, side = %order, error = %e, "Entry order failed");
                Err(e)
            }
        }
    }

    /// Buy on the cheap venue, then sell on the dear one.
    pub async fn execute_arbitrage(&self, opp: &Opportunity, amount: Decimal) -> GateResult<ArbitrageFill> {
        let pair = &opp.pair;

        let buy = self
            .venue
            .execute(pair, OrderSide::Buy, amount, opp.buy_price, opp.buy_venue)
            .await
            .map_err(|e| {
                warn!(pair = %pair, venue = %opp.buy_venue, error = %e, "Arbitrage buy leg failed, nothing filled");
                e
            })?;

        let sell = match self
            .venue
            .execute(pair, OrderSide::Sell, buy.amount, opp.sell_price, opp.sell_venue)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(
                    pair = %pair,
                    buy_venue = %opp.buy_venue,
                    sell_venue = %opp.sell_venue,
                    amount = %buy.amount,
                    buy_trade = %buy.trade_id,
                    error = %e,
                    "UNHEDGED LEG: sell failed after buy filled"
                );
                return Err(TradeGateError::UnhedgedLeg {
                    pair: pair.clone(),
                    buy_venue: opp.buy_venue,
                    sell_venue: opp.sell_venue,
                    amount: buy.amount,
                    message: e.to_string(),
                });
            }
        };

        let fill = ArbitrageFill { buy, sell };
        info!(
            pair = %pair,
            buy = %fill.buy.trade_id,
            sell = %fill.sell.trade_id,
            gross = %fill.gross_profit().round_dp(4),
            "Arbitrage executed"
        );
        Ok(fill)
    }
}
