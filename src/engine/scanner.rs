//! Multi-venue price scanner.
//!
//! Fans a quote request for one pair out to every configured price source,
//! waits for all of them, and keeps whatever came back. A slow or failing
//! source only costs its own quote for this cycle.

use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::types::{Pair, VenueQuote};
use crate::venues::PriceSource;

/// Consecutive starved cycles before the shortage is logged as a warning.
const STARVED_WARN_AFTER: u32 = 3;

pub struct VenueRouter {
    sources: Vec<Arc<dyn PriceSource>>,
    /// Consecutive cycles each pair had fewer than two usable quotes.
    starved: Mutex<HashMap<Pair, u32>>,
}

impl VenueRouter {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>) -> Self {
        Self {
            sources,
            starved: Mutex::new(HashMap::new()),
        }
    }

    /// Quotes for `pair` from every source that answered, one per venue.
    pub async fn quotes(&self, pair: &Pair) -> Vec<VenueQuote> {
        let results = join_all(self.sources.iter().map(|s| s.quote(pair))).await;

        let mut quotes: Vec<VenueQuote> = Vec::with_capacity(results.len());
        for (source, result) in self.sources.iter().zip(results) {
            match result.and_then(VenueQuote::validate) {
                Ok(q) if q.venue != source.venue() => {
                    warn!(expected = %source.venue(), got = %q.venue, "Quote from wrong venue, dropped");
                }
                Ok(q) if quotes.iter().any(|e| e.venue == q.venue) => {
                    debug!(venue = %q.venue, "Duplicate venue quote, keeping first");
                }
                Ok(q) => {
                    debug!(pair = %pair, venue = %q.venue, price = %q.price, "Quote");
                    quotes.push(q);
                }
                Err(e) => {
                    warn!(pair = %pair, venue = %source.venue(), error = %e, "Price fetch failed, skipping venue");
                }
            }
        }

        self.track_starvation(pair, quotes.len());
        quotes
    }

    /// Consecutive cycles `pair` has been below two quotes.
    pub fn starved_cycles(&self, pair: &Pair) -> u32 {
        self.starved
            .lock()
            .map(|m| m.get(pair).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn track_starvation(&self, pair: &Pair, usable: usize) {
        let Ok(mut starved) = self.starved.lock() else {
            return;
        };
        if usable >= 2 {
            starved.remove(pair);
            return;
        }
        let streak = starved.entry(pair.clone()).or_insert(0);
        *streak += 1;
        if *streak >= STARVED_WARN_AFTER {
            warn!(pair = %pair, usable, cycles = *streak, "Venue data unavailable for consecutive cycles");
        } else {
            debug!(pair = %pair, usable, "Too few venue quotes this cycle");
        }
    }
}

/// Mean price across quotes; `None` for an empty slice.
pub fn mean_price(quotes: &[VenueQuote]) -> Option<Decimal> {
    if quotes.is_empty() {
        return None;
    }
    let sum: Decimal = quotes.iter().map(|q| q.price).sum();
    Some(sum / Decimal::from(quotes.len()))
}
