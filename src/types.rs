//! Shared types used across all TradeGate modules.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result alias for collaborator calls and ledger operations that carry an
/// explicit error kind.
pub type GateResult<T> = std::result::Result<T, TradeGateError>;

/// Convert an `f64` into a `Decimal`, mapping NaN/inf to zero.
pub fn d(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Pairs and venues
// ---------------------------------------------------------------------------

/// A trading pair such as `SOL/USDC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.trim().to_uppercase(),
            quote: quote.trim().to_uppercase(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl FromStr for Pair {
    type Err = TradeGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) if !base.trim().is_empty() && !quote.trim().is_empty() => {
                Ok(Pair::new(base, quote))
            }
            _ => Err(TradeGateError::Config(format!(
                "invalid pair '{s}', expected BASE/QUOTE"
            ))),
        }
    }
}

impl TryFrom<String> for Pair {
    type Error = TradeGateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Venues with a price source implementation. Anything else is rejected
/// when the configuration is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Coinbase,
    Kraken,
    CoinGecko,
}

impl Venue {
    pub const ALL: [Venue; 4] = [Venue::Binance, Venue::Coinbase, Venue::Kraken, Venue::CoinGecko];

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Coinbase => "coinbase",
            Venue::Kraken => "kraken",
            Venue::CoinGecko => "coingecko",
        }
    }
}

impl FromStr for Venue {
    type Err = TradeGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Venue::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TradeGateError::Config(format!("unknown venue '{s}'")))
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One venue's price for one pair at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueQuote {
    pub venue: Venue,
    pub price: Decimal,
    /// Pool depth in quote currency, when the venue reports it.
    pub liquidity: Option<Decimal>,
    pub observed_at: DateTime<Utc>,
}

impl VenueQuote {
    pub fn new(venue: Venue, price: Decimal, liquidity: Option<Decimal>) -> Self {
        Self {
            venue,
            price,
            liquidity,
            observed_at: Utc::now(),
        }
    }

    /// Reject quotes that cannot be priced against.
    pub fn validate(self) -> GateResult<Self> {
        if self.price <= Decimal::ZERO {
            return Err(TradeGateError::DataUnavailable {
                source_name: self.venue.to_string(),
                message: format!("non-positive price {}", self.price),
            });
        }
        if matches!(self.liquidity, Some(l) if l < Decimal::ZERO) {
            return Err(TradeGateError::DataUnavailable {
                source_name: self.venue.to_string(),
                message: "negative liquidity".to_string(),
            });
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Sides and strategies
// ---------------------------------------------------------------------------

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order that opens a position on this side.
    pub fn entry_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Direction of a single order sent to a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Which strategy loop produced a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Arbitrage,
    Swing,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Arbitrage => write!(f, "arbitrage"),
            Strategy::Swing => write!(f, "swing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// An open position. Owned exclusively by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub trade_id: String,
    pub pair: Pair,
    pub side: Side,
    pub strategy: Strategy,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// PnL of this position if marked at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (price - self.entry_price) * self.amount,
            Side::Short => (self.entry_price - price) * self.amount,
        }
    }

    /// Notional at entry.
    pub fn cost_basis(&self) -> Decimal {
        self.entry_price * self.amount
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    StopLoss,
    TakeProfit,
    EmergencyStop,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Manual => write!(f, "manual"),
            CloseReason::StopLoss => write!(f, "stop_loss"),
            CloseReason::TakeProfit => write!(f, "take_profit"),
            CloseReason::EmergencyStop => write!(f, "emergency_stop"),
        }
    }
}

/// Outcome of marking a position to a new price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceTrigger {
    None,
    StopLoss,
    TakeProfit,
}

impl PriceTrigger {
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            PriceTrigger::None => None,
            PriceTrigger::StopLoss => Some(CloseReason::StopLoss),
            PriceTrigger::TakeProfit => Some(CloseReason::TakeProfit),
        }
    }
}

/// Immutable record of a closed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPosition {
    #[serde(flatten)]
    pub position: Position,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub reason: CloseReason,
    pub closed_at: DateTime<Utc>,
}

impl ClosedPosition {
    pub fn is_winner(&self) -> bool {
        self.realized_pnl > Decimal::ZERO
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// A cross-venue arbitrage candidate. Only actionable within the scan cycle
/// that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub pair: Pair,
    pub buy_venue: Venue,
    pub sell_venue: Venue,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    /// Spread relative to the cheaper venue.
    pub profit_pct: Decimal,
    pub confidence: Decimal,
    pub required_capital: Decimal,
    pub estimated_profit: Decimal,
    /// Combined taker fees of both legs, as a fraction.
    pub estimated_fees: Decimal,
    /// True when both venues reported liquidity.
    pub liquidity_known: bool,
    pub discovered_at: DateTime<Utc>,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buy@{} {} sell@{} {} ({:.3}% conf {:.2})",
            self.pair,
            self.buy_venue,
            self.buy_price,
            self.sell_venue,
            self.sell_price,
            self.profit_pct * Decimal::ONE_HUNDRED,
            self.confidence
        )
    }
}

/// Indicator values for one pair, computed from its price history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Oscillator (RSI), 0..100.
    pub oscillator: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    /// Momentum (MACD line).
    pub momentum: f64,
    /// Momentum baseline (MACD signal line).
    pub momentum_baseline: f64,
    /// Long-horizon price average (SMA).
    pub long_average: f64,
}

/// A directional momentum candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub pair: Pair,
    pub side: Side,
    pub price: Decimal,
    pub confidence: Decimal,
    /// Above the stricter execution bar.
    pub actionable: bool,
    pub indicators: IndicatorSnapshot,
    pub produced_at: DateTime<Utc>,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} (rsi {:.1} conf {:.2})",
            self.pair, self.side, self.price, self.indicators.oscillator, self.confidence
        )
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Receipt returned by an execution venue for one filled order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub trade_id: String,
    pub venue: Venue,
    pub pair: Pair,
    pub side: OrderSide,
    pub amount: Decimal,
    pub price: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl TradeReceipt {
    pub fn paper(venue: Venue, pair: &Pair, side: OrderSide, amount: Decimal, price: Decimal) -> Self {
        Self {
            trade_id: format!("paper-{}", uuid::Uuid::new_v4()),
            venue,
            pair: pair.clone(),
            side,
            amount,
            price,
            executed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TradeGateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data unavailable ({source_name}): {message}")]
    DataUnavailable { source_name: String, message: String },

    #[error("Execution failed on {venue}: {message}")]
    Execution { venue: Venue, message: String },

    #[error(
        "Unhedged leg on {pair}: bought {amount} on {buy_venue}, sell on {sell_venue} failed: {message}"
    )]
    UnhedgedLeg {
        pair: Pair,
        buy_venue: Venue,
        sell_venue: Venue,
        amount: Decimal,
        message: String,
    },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
