//! Cross-venue arbitrage detection.
//!
//! Compares every pair of venue quotes for one trading pair, emits a
//! candidate for each spread at or above the profit threshold (buy the
//! cheaper venue, sell the dearer), scores it, ranks the survivors and keeps
//! the top few for this cycle. Candidates enter the burst throttle one at a
//! time, as each is taken to the gate.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::debug;

use super::throttle::BurstThrottle;
use crate::config::AppConfig;
use crate::types::{Opportunity, Pair, Venue, VenueQuote};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OpportunityConfig {
    pub min_profit: Decimal,
    pub liquidity_reference: Decimal,
    pub profit_reference: Decimal,
    pub profit_only_reference: Decimal,
    /// Floor for liquidity-aware confidence.
    pub min_confidence: Decimal,
    pub max_capital: Decimal,
    pub liquidity_capital_fraction: Decimal,
    /// Capital assumed when liquidity is unknown.
    pub default_capital: Decimal,
    pub top_k: usize,
    pub fees: HashMap<Venue, Decimal>,
    pub history_capacity: usize,
    pub burst_cap: usize,
    pub burst_window: Duration,
}

impl Default for OpportunityConfig {
    fn default() -> Self {
        Self {
            min_profit: dec!(0.001),
            liquidity_reference: dec!(50000),
            profit_reference: dec!(0.005),
            profit_only_reference: dec!(0.01),
            min_confidence: dec!(0.3),
            max_capital: dec!(10000),
            liquidity_capital_fraction: dec!(0.1),
            default_capital: dec!(500),
            top_k: 5,
            fees: HashMap::new(),
            history_capacity: 100,
            burst_cap: 3,
            burst_window: Duration::seconds(60),
        }
    }
}

impl OpportunityConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        let a = &cfg.arbitrage;
        Self {
            min_profit: cfg.risk.min_arbitrage_profit,
            liquidity_reference: a.liquidity_reference,
            profit_reference: a.profit_reference,
            profit_only_reference: a.profit_only_reference,
            min_confidence: a.min_confidence,
            max_capital: a.max_capital,
            liquidity_capital_fraction: a.liquidity_capital_fraction,
            default_capital: cfg.risk.min_trade_size,
            top_k: a.top_k,
            fees: Venue::ALL.iter().map(|v| (*v, cfg.fee_rate(*v))).collect(),
            history_capacity: a.history_capacity,
            burst_cap: a.burst_cap,
            burst_window: Duration::seconds(a.burst_window_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct OpportunityEvaluator {
    config: OpportunityConfig,
    throttle: BurstThrottle,
}

impl OpportunityEvaluator {
    pub fn new(config: OpportunityConfig) -> Self {
        let throttle = BurstThrottle::new(config.history_capacity, config.burst_cap, config.burst_window);
        Self { config, throttle }
    }

    /// Recent candidates per pair, consulted by the execution gate.
    pub fn throttle(&self) -> &BurstThrottle {
        &self.throttle
    }

    /// Count one candidate for `pair` against the burst window. Called just
    /// before that candidate is gated.
    pub fn record_candidate(&mut self, pair: &Pair, now: DateTime<Utc>) {
        self.throttle.record(pair, now);
    }

    /// Ranked candidates for `pair` from this cycle's quotes.
    pub fn evaluate(&self, pair: &Pair, quotes: &[VenueQuote], now: DateTime<Utc>) -> Vec<Opportunity> {
        if quotes.len() < 2 {
            debug!(pair = %pair, venues = quotes.len(), "Not enough venues for arbitrage");
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (i, a) in quotes.iter().enumerate() {
            for b in &quotes[i + 1..] {
                if a.venue == b.venue {
                    continue;
                }
                if let Some(opp) = self.compare(pair, a, b, now) {
                    candidates.push(opp);
                }
            }
        }

        let all_liquid = candidates.iter().all(|c| c.liquidity_known);
        if all_liquid {
            candidates.sort_by(|x, y| y.estimated_profit.cmp(&x.estimated_profit));
        } else {
            candidates.sort_by(|x, y| y.profit_pct.cmp(&x.profit_pct));
        }
        candidates.truncate(self.config.top_k);

        for c in &candidates {
            debug!(opportunity = %c, "Arbitrage candidate");
        }
        candidates
    }

    fn compare(&self, pair: &Pair, a: &VenueQuote, b: &VenueQuote, now: DateTime<Utc>) -> Option<Opportunity> {
        let (buy, sell) = if a.price <= b.price { (a, b) } else { (b, a) };
        if buy.price <= Decimal::ZERO {
            return None;
        }

        let spread = (sell.price - buy.price) / buy.price;
        if spread < self.config.min_profit {
            return None;
        }

        let c = &self.config;
        let (confidence, capital, liquidity_known) = match (buy.liquidity, sell.liquidity) {
            (Some(lb), Some(ls)) => {
                let min_liquidity = lb.min(ls);
                let confidence = (min_liquidity / c.liquidity_reference).min(Decimal::ONE)
                    * (spread / c.profit_reference).min(Decimal::ONE);
                if confidence < c.min_confidence {
                    debug!(
                        pair = %pair,
                        buy = %buy.venue,
                        sell = %sell.venue,
                        confidence = %confidence.round_dp(3),
                        "Discarding low-confidence arbitrage"
                    );
                    return None;
                }
                let capital = (min_liquidity * c.liquidity_capital_fraction).min(c.max_capital);
                (confidence, capital, true)
            }
            _ => {
                let confidence = (spread / c.profit_only_reference).min(Decimal::ONE);
                (confidence, c.default_capital, false)
            }
        };

        let fee = |v: Venue| c.fees.get(&v).copied().unwrap_or(Decimal::ZERO);

        Some(Opportunity {
            pair: pair.clone(),
            buy_venue: buy.venue,
            sell_venue: sell.venue,
            buy_price: buy.price,
            sell_price: sell.price,
            profit_pct: spread,
            confidence,
            required_capital: capital,
            estimated_profit: capital * spread,
            estimated_fees: fee(buy.venue) + fee(sell.venue),
            liquidity_known,
            discovered_at: now,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
