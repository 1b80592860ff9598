//! Momentum (swing) signal detection.
//!
//! Keeps a bounded closing-price history per pair and, once the indicator
//! lookback is filled, applies conjunctive entry rules:
//!
//! - Long: oscillator oversold, short EMA above long EMA, momentum above its
//!   baseline, price above the long average.
//! - Short: the mirror image.
//!
//! Any missing condition means no signal. Confidence is measured from the
//! opposite threshold, so a deeply oversold long saturates at 1.0.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use super::throttle::BurstThrottle;
use crate::config::SwingConfig;
use crate::indicators::IndicatorSource;
use crate::types::{d, IndicatorSnapshot, Pair, Side, Signal};

#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub history_capacity: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub confidence_span: f64,
    pub emit_floor: Decimal,
    pub actionable_confidence: Decimal,
    pub throttle_capacity: usize,
    pub burst_cap: usize,
    pub burst_window: Duration,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            history_capacity: 200,
            oversold: 30.0,
            overbought: 70.0,
            confidence_span: 40.0,
            emit_floor: dec!(0.3),
            actionable_confidence: dec!(0.5),
            throttle_capacity: 50,
            burst_cap: 2,
            burst_window: Duration::hours(1),
        }
    }
}

impl From<&SwingConfig> for SignalConfig {
    fn from(s: &SwingConfig) -> Self {
        Self {
            history_capacity: s.history_capacity,
            oversold: s.oversold,
            overbought: s.overbought,
            confidence_span: s.confidence_span,
            emit_floor: s.emit_floor,
            actionable_confidence: s.actionable_confidence,
            throttle_capacity: s.throttle_capacity,
            burst_cap: s.burst_cap,
            burst_window: Duration::seconds(s.burst_window_secs),
        }
    }
}

pub struct SignalEvaluator {
    config: SignalConfig,
    indicators: Arc<dyn IndicatorSource>,
    histories: HashMap<Pair, VecDeque<f64>>,
    throttle: BurstThrottle,
}

impl SignalEvaluator {
    pub fn new(config: SignalConfig, indicators: Arc<dyn IndicatorSource>) -> Self {
        let throttle = BurstThrottle::new(config.throttle_capacity, config.burst_cap, config.burst_window);
        Self {
            config,
            indicators,
            histories: HashMap::new(),
            throttle,
        }
    }

    pub fn throttle(&self) -> &BurstThrottle {
        &self.throttle
    }

    /// Append a price to the pair's history, dropping the oldest on overflow.
    pub fn observe(&mut self, pair: &Pair, price: Decimal) {
        let Some(value) = price.to_f64() else {
            return;
        };
        let capacity = self.config.history_capacity.max(1);
        let history = self.histories.entry(pair.clone()).or_default();
        if history.len() == capacity {
            history.pop_front();
        }
        history.push_back(value);
    }

    pub fn history_len(&self, pair: &Pair) -> usize {
        self.histories.get(pair).map_or(0, VecDeque::len)
    }

    /// Evaluate the pair at `price` against its accumulated history.
    pub fn evaluate(&mut self, pair: &Pair, price: Decimal, now: DateTime<Utc>) -> Option<Signal> {
        let history = self.histories.get(pair)?;
        if history.len() < self.indicators.min_lookback() {
            debug!(
                pair = %pair,
                have = history.len(),
                need = self.indicators.min_lookback(),
                "Warming up price history"
            );
            return None;
        }

        let prices: Vec<f64> = history.iter().copied().collect();
        let snapshot = self.indicators.compute(&prices)?;
        self.evaluate_snapshot(pair, price, snapshot, now)
    }

    /// Apply the entry rules to a precomputed snapshot.
    pub fn evaluate_snapshot(
        &mut self,
        pair: &Pair,
        price: Decimal,
        snapshot: IndicatorSnapshot,
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        let (side, confidence) = self.classify(&snapshot, price.to_f64()?)?;
        if confidence <= self.config.emit_floor {
            debug!(pair = %pair, side = %side, confidence = %confidence.round_dp(3), "Signal below emit floor");
            return None;
        }

        self.throttle.record(pair, now);
        let signal = Signal {
            pair: pair.clone(),
            side,
            price,
            confidence,
            actionable: confidence >= self.config.actionable_confidence,
            indicators: snapshot,
            produced_at: now,
        };
        debug!(signal = %signal, actionable = signal.actionable, "Swing signal");
        Some(signal)
    }

    fn classify(&self, s: &IndicatorSnapshot, price: f64) -> Option<(Side, Decimal)> {
        let c = &self.config;

        let long = s.oscillator < c.oversold
            && s.ema_short > s.ema_long
            && s.momentum > s.momentum_baseline
            && price > s.long_average;
        if long {
            let raw = (c.overbought - s.oscillator) / c.confidence_span;
            return Some((Side::Long, d(raw.clamp(0.0, 1.0))));
        }

        let short = s.oscillator > c.overbought
            && s.ema_short < s.ema_long
            && s.momentum < s.momentum_baseline
            && price < s.long_average;
        if short {
            let raw = (s.oscillator - c.oversold) / c.confidence_span;
            return Some((Side::Short, d(raw.clamp(0.0, 1.0))));
        }

        None
    }
}
