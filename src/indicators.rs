//! Technical indicators over a closing-price history.
//!
//! The swing evaluator consumes indicators through [`IndicatorSource`] as an
//! opaque snapshot. [`StandardIndicators`] is the default implementation:
//! simple-average RSI, seeded EMAs, MACD with a proportional signal baseline
//! and a trailing SMA.

use crate::config::IndicatorConfig;
use crate::types::IndicatorSnapshot;

/// Pure function from a price history (oldest first) to an indicator
/// snapshot.
pub trait IndicatorSource: Send + Sync {
    /// `None` while the history is shorter than [`Self::min_lookback`].
    fn compute(&self, history: &[f64]) -> Option<IndicatorSnapshot>;

    /// Points required before `compute` returns a snapshot.
    fn min_lookback(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct StandardIndicators {
    config: IndicatorConfig,
}

impl StandardIndicators {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }
}

impl Default for StandardIndicators {
    fn default() -> Self {
        Self::new(IndicatorConfig::default())
    }
}

impl IndicatorSource for StandardIndicators {
    fn compute(&self, history: &[f64]) -> Option<IndicatorSnapshot> {
        if history.len() < self.min_lookback() {
            return None;
        }
        let c = &self.config;

        let ema_short = ema(history, c.ema_short)?;
        let ema_long = ema(history, c.ema_long)?;
        let momentum = ema_short - ema_long;

        Some(IndicatorSnapshot {
            oscillator: rsi(history, c.rsi_period)?,
            ema_short,
            ema_long,
            momentum,
            momentum_baseline: momentum * c.macd_signal_factor,
            long_average: sma(history, c.sma_period)?,
        })
    }

    fn min_lookback(&self) -> usize {
        self.config.min_lookback
    }
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

/// Relative strength index over the last `period` changes.
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let window = &prices[prices.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for w in window.windows(2) {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Exponential moving average seeded from the first price.
pub fn ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut value = prices[0];
    for p in &prices[1..] {
        value = (p - value) * multiplier + value;
    }
    Some(value)
}

/// Simple average of the last `period` prices.
pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let window = &prices[prices.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}
