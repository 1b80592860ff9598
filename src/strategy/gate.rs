//! Execution gate: the veto pipeline every candidate passes before it can
//! touch the ledger.
//!
//! Checks, in order: ledger open limits, strategy confidence minimum,
//! per-pair burst throttle, and (arbitrage only) net edge after fees. All
//! checks run every time so a rejection lists every reason; any single veto
//! rejects the whole candidate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

use super::throttle::BurstThrottle;
use crate::engine::ledger::{LimitBreach, PortfolioLedger};
use crate::types::{Opportunity, Pair, Side, Signal, Strategy};

/// What the gate needs to know about a candidate.
pub trait Candidate {
    fn pair(&self) -> &Pair;
    fn side(&self) -> Side;
    fn entry_price(&self) -> Decimal;
    fn confidence(&self) -> Decimal;
    fn strategy(&self) -> Strategy;
    /// Edge left after fees; `None` for candidates without one.
    fn net_edge(&self) -> Option<Decimal> {
        None
    }
}

impl Candidate for Opportunity {
    fn pair(&self) -> &Pair {
        &self.pair
    }

    fn side(&self) -> Side {
        Side::Long
    }

    fn entry_price(&self) -> Decimal {
        self.buy_price
    }

    fn confidence(&self) -> Decimal {
        self.confidence
    }

    fn strategy(&self) -> Strategy {
        Strategy::Arbitrage
    }

    fn net_edge(&self) -> Option<Decimal> {
        Some(self.profit_pct - self.estimated_fees)
    }
}

impl Candidate for Signal {
    fn pair(&self) -> &Pair {
        &self.pair
    }

    fn side(&self) -> Side {
        self.side
    }

    fn entry_price(&self) -> Decimal {
        self.price
    }

    fn confidence(&self) -> Decimal {
        self.confidence
    }

    fn strategy(&self) -> Strategy {
        Strategy::Swing
    }
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Veto {
    Ledger(LimitBreach),
    LowConfidence { confidence: Decimal, minimum: Decimal },
    Throttled { recent: usize, cap: usize },
    ThinEdge { net_edge: Decimal, minimum: Decimal },
}

impl fmt::Display for Veto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Veto::Ledger(breach) => write!(f, "{breach}"),
            Veto::LowConfidence { confidence, minimum } => {
                write!(f, "confidence {confidence:.3} below {minimum}")
            }
            Veto::Throttled { recent, cap } => write!(f, "{recent} candidates in window, cap {cap}"),
            Veto::ThinEdge { net_edge, minimum } => {
                write!(f, "net edge {net_edge:.5} below {minimum}")
            }
        }
    }
}

/// A candidate the gate refused. Not an error: logged and never retried.
#[derive(Debug, Clone, PartialEq)]
pub struct GateRejection {
    pub pair: Pair,
    pub strategy: Strategy,
    pub vetoes: Vec<Veto>,
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<String> = self.vetoes.iter().map(ToString::to_string).collect();
        write!(f, "{} {} rejected: {}", self.strategy, self.pair, reasons.join("; "))
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionGate {
    min_confidence: Decimal,
    min_net_edge: Decimal,
}

impl ExecutionGate {
    pub fn new(min_confidence: Decimal, min_net_edge: Decimal) -> Self {
        Self {
            min_confidence,
            min_net_edge,
        }
    }

    /// Size the candidate and run every veto. Returns the approved amount.
    pub fn check<C: Candidate>(
        &self,
        candidate: &C,
        ledger: &PortfolioLedger,
        throttle: &BurstThrottle,
        now: DateTime<Utc>,
    ) -> Result<Decimal, GateRejection> {
        let pair = candidate.pair();
        let price = candidate.entry_price();
        let amount = ledger.size_position(pair, price, candidate.confidence());

        let mut vetoes = Vec::new();

        if let Err(breach) = ledger.check_open(pair, amount, price) {
            vetoes.push(Veto::Ledger(breach));
        }
        if candidate.confidence() < self.min_confidence {
            vetoes.push(Veto::LowConfidence {
                confidence: candidate.confidence(),
                minimum: self.min_confidence,
            });
        }
        if throttle.is_saturated(pair, now) {
            vetoes.push(Veto::Throttled {
                recent: throttle.recent(pair, now),
                cap: throttle.burst_cap(),
            });
        }
        if let Some(net_edge) = candidate.net_edge() {
            if net_edge < self.min_net_edge {
                vetoes.push(Veto::ThinEdge {
                    net_edge,
                    minimum: self.min_net_edge,
                });
            }
        }

        if vetoes.is_empty() {
            Ok(amount)
        } else {
            Err(GateRejection {
                pair: pair.clone(),
                strategy: candidate.strategy(),
                vetoes,
            })
        }
    }
}
