//! Per-pair burst throttle.
//!
//! Each pair keeps a bounded ring of recent candidate timestamps. A pair is
//! saturated when more than `burst_cap` of those fall inside the trailing
//! window; profitability plays no part.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

use crate::types::Pair;

#[derive(Debug, Clone)]
pub struct BurstThrottle {
    capacity: usize,
    burst_cap: usize,
    window: Duration,
    history: HashMap<Pair, VecDeque<DateTime<Utc>>>,
}

impl BurstThrottle {
    pub fn new(capacity: usize, burst_cap: usize, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            burst_cap,
            window,
            history: HashMap::new(),
        }
    }

    /// Record one candidate for `pair`, dropping the oldest entry on overflow.
    pub fn record(&mut self, pair: &Pair, at: DateTime<Utc>) {
        let ring = self.history.entry(pair.clone()).or_default();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(at);
    }

    /// Candidates recorded for `pair` within the window ending at `now`.
    pub fn recent(&self, pair: &Pair, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        self.history
            .get(pair)
            .map(|ring| ring.iter().filter(|t| **t > cutoff && **t <= now).count())
            .unwrap_or(0)
    }

    pub fn is_saturated(&self, pair: &Pair, now: DateTime<Utc>) -> bool {
        self.recent(pair, now) > self.burst_cap
    }

    pub fn burst_cap(&self) -> usize {
        self.burst_cap
    }

    pub fn len(&self, pair: &Pair) -> usize {
        self.history.get(pair).map_or(0, VecDeque::len)
    }
}
