//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section falls back to the defaults below, so a partial file is valid.
//! `validate()` turns bad risk parameters into a fatal configuration error
//! before any loop starts.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

use crate::types::{Pair, TradeGateError, Venue};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub risk: RiskConfig,
    pub arbitrage: ArbitrageConfig,
    pub swing: SwingConfig,
    pub indicators: IndicatorConfig,
    pub scaling: ScalingConfig,
    pub venues: Vec<VenueConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    /// Only `paper` is supported.
    pub mode: String,
    pub initial_portfolio_value: Decimal,
    pub summary_path: String,
    /// Sleep after a failed cycle before the next one.
    pub error_backoff_secs: u64,
    /// Emergency-stop all open positions before writing the summary.
    pub liquidate_on_shutdown: bool,
    /// Stop on its own after this many hours; runs until Ctrl+C when unset.
    pub run_hours: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "TRADEGATE-001".to_string(),
            mode: "paper".to_string(),
            initial_portfolio_value: dec!(10000),
            summary_path: "tradegate_summary.json".to_string(),
            error_backoff_secs: 60,
            liquidate_on_shutdown: true,
            run_hours: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub min_arbitrage_profit: Decimal,
    /// Largest single position as a fraction of portfolio value.
    pub max_position_size: Decimal,
    /// Smallest notional worth sending to a venue.
    pub min_trade_size: Decimal,
    /// Daily loss fraction that trips the circuit breaker.
    pub max_daily_loss: Decimal,
    pub stop_loss_percentage: Decimal,
    pub take_profit_percentage: Decimal,
    /// Hard cap on any position's notional as a fraction of portfolio value.
    pub reserve_fraction: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_arbitrage_profit: dec!(0.001), // 0.1%
            max_position_size: dec!(0.3),      // 30% of portfolio
            min_trade_size: dec!(500),
            max_daily_loss: dec!(0.05), // 5%
            stop_loss_percentage: dec!(0.03),
            take_profit_percentage: dec!(0.05),
            reserve_fraction: dec!(0.8),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArbitrageConfig {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub pairs: Vec<Pair>,
    /// Liquidity at which liquidity stops limiting confidence.
    pub liquidity_reference: Decimal,
    /// Spread at which spread stops limiting confidence (liquidity known).
    pub profit_reference: Decimal,
    /// Spread at which confidence saturates when no liquidity is reported.
    pub profit_only_reference: Decimal,
    /// Liquidity-aware candidates below this confidence are discarded.
    pub min_confidence: Decimal,
    /// Minimum confidence the execution gate accepts for arbitrage.
    pub gate_min_confidence: Decimal,
    pub max_capital: Decimal,
    pub liquidity_capital_fraction: Decimal,
    pub top_k: usize,
    pub burst_cap: usize,
    pub burst_window_secs: i64,
    pub history_capacity: usize,
    /// Share of the quoted spread assumed captured on settlement.
    pub profit_realization: Decimal,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 30,
            pairs: vec![Pair::new("SOL", "USDC"), Pair::new("ETH", "USDC")],
            liquidity_reference: dec!(50000),
            profit_reference: dec!(0.005),
            profit_only_reference: dec!(0.01),
            min_confidence: dec!(0.3),
            gate_min_confidence: dec!(0.1),
            max_capital: dec!(10000),
            liquidity_capital_fraction: dec!(0.1),
            top_k: 5,
            burst_cap: 3,
            burst_window_secs: 60,
            history_capacity: 100,
            profit_realization: dec!(0.8),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SwingConfig {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub pairs: Vec<Pair>,
    pub history_capacity: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub confidence_span: f64,
    /// Signals below this confidence are not emitted.
    pub emit_floor: Decimal,
    /// Signals must reach this confidence to pass the execution gate.
    pub actionable_confidence: Decimal,
    pub burst_cap: usize,
    pub burst_window_secs: i64,
    pub throttle_capacity: usize,
    pub execution_venue: Venue,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 300,
            pairs: vec![
                Pair::new("SOL", "USDC"),
                Pair::new("ETH", "USDC"),
                Pair::new("BTC", "USDC"),
            ],
            history_capacity: 200,
            oversold: 30.0,
            overbought: 70.0,
            confidence_span: 40.0,
            emit_floor: dec!(0.3),
            actionable_confidence: dec!(0.5),
            burst_cap: 2,
            burst_window_secs: 3600,
            throttle_capacity: 50,
            execution_venue: Venue::Binance,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub ema_short: usize,
    pub ema_long: usize,
    /// MACD signal baseline as a fraction of the MACD line.
    pub macd_signal_factor: f64,
    pub sma_period: usize,
    pub min_lookback: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_short: 12,
            ema_long: 26,
            macd_signal_factor: 0.8,
            sma_period: 50,
            min_lookback: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScalingConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
    /// Win rate (0..1) that must be exceeded to advance.
    pub win_rate_threshold: Decimal,
    /// Total return fraction that must be exceeded to advance.
    pub min_total_return: Decimal,
    pub phases: Vec<PhaseConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PhaseConfig {
    /// Elapsed run time at which this phase may hand over to the next.
    pub duration_hours: u64,
    pub min_trade_size: Decimal,
    pub max_position_size: Decimal,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        let phase = |duration_hours, min_trade_size, max_position_size| PhaseConfig {
            duration_hours,
            min_trade_size,
            max_position_size,
        };
        Self {
            enabled: true,
            check_interval_secs: 60,
            win_rate_threshold: dec!(0.6),
            min_total_return: Decimal::ZERO,
            phases: vec![
                phase(2, dec!(50), dec!(0.10)),
                phase(4, dec!(75), dec!(0.15)),
                phase(6, dec!(100), dec!(0.20)),
                phase(12, dec!(150), dec!(0.25)),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct VenueConfig {
    pub venue: Venue,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Taker fee per leg, as a fraction.
    #[serde(default)]
    pub fee_rate: Decimal,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Venues that are switched on.
    pub fn enabled_venues(&self) -> Vec<&VenueConfig> {
        self.venues.iter().filter(|v| v.enabled).collect()
    }

    /// Per-leg fee for a venue; zero when unconfigured.
    pub fn fee_rate(&self, venue: Venue) -> Decimal {
        self.venues
            .iter()
            .find(|v| v.venue == venue)
            .map(|v| v.fee_rate)
            .unwrap_or(Decimal::ZERO)
    }

    /// Reject parameters the engine cannot run with.
    pub fn validate(&self) -> std::result::Result<(), TradeGateError> {
        let fail = |msg: String| Err(TradeGateError::Config(msg));

        if self.agent.mode != "paper" {
            return fail(format!("unsupported mode '{}', only 'paper' is available", self.agent.mode));
        }
        if self.agent.initial_portfolio_value <= Decimal::ZERO {
            return fail("agent.initial_portfolio_value must be positive".into());
        }

        let r = &self.risk;
        for (name, value) in [
            ("risk.max_position_size", r.max_position_size),
            ("risk.max_daily_loss", r.max_daily_loss),
            ("risk.stop_loss_percentage", r.stop_loss_percentage),
            ("risk.take_profit_percentage", r.take_profit_percentage),
            ("risk.reserve_fraction", r.reserve_fraction),
        ] {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return fail(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if r.min_trade_size <= Decimal::ZERO {
            return fail("risk.min_trade_size must be positive".into());
        }
        if r.min_arbitrage_profit < Decimal::ZERO {
            return fail("risk.min_arbitrage_profit must not be negative".into());
        }

        if self.arbitrage.enabled {
            if self.arbitrage.pairs.is_empty() {
                return fail("arbitrage.pairs is empty".into());
            }
            if self.enabled_venues().len() < 2 {
                return fail("arbitrage needs at least two enabled venues".into());
            }
            if self.arbitrage.liquidity_reference <= Decimal::ZERO
                || self.arbitrage.profit_reference <= Decimal::ZERO
                || self.arbitrage.profit_only_reference <= Decimal::ZERO
            {
                return fail("arbitrage confidence references must be positive".into());
            }
            if self.arbitrage.top_k == 0 || self.arbitrage.history_capacity == 0 {
                return fail("arbitrage.top_k and history_capacity must be positive".into());
            }
        }

        if self.swing.enabled {
            if self.swing.pairs.is_empty() {
                return fail("swing.pairs is empty".into());
            }
            if self.swing.oversold >= self.swing.overbought || self.swing.confidence_span <= 0.0 {
                return fail("swing thresholds must satisfy oversold < overbought and span > 0".into());
            }
            if self.swing.history_capacity < self.indicators.min_lookback {
                return fail("swing.history_capacity is shorter than indicators.min_lookback".into());
            }
            if !self.venues.iter().any(|v| v.enabled && v.venue == self.swing.execution_venue) {
                return fail(format!(
                    "swing.execution_venue {} is not an enabled venue",
                    self.swing.execution_venue
                ));
            }
        }

        let i = &self.indicators;
        if i.ema_short == 0 || i.ema_short >= i.ema_long {
            return fail("indicators.ema_short must be positive and below ema_long".into());
        }
        if i.rsi_period == 0 || i.sma_period == 0 {
            return fail("indicator periods must be positive".into());
        }
        if i.min_lookback < i.sma_period.max(i.ema_long).max(i.rsi_period + 1) {
            return fail("indicators.min_lookback is shorter than the longest indicator period".into());
        }

        if self.scaling.enabled {
            if self.scaling.phases.is_empty() {
                return fail("scaling.phases is empty".into());
            }
            for pair in self.scaling.phases.windows(2) {
                if pair[1].duration_hours <= pair[0].duration_hours {
                    return fail("scaling.phases durations must strictly increase".into());
                }
            }
            for phase in &self.scaling.phases {
                if phase.min_trade_size <= Decimal::ZERO
                    || phase.max_position_size <= Decimal::ZERO
                    || phase.max_position_size > Decimal::ONE
                {
                    return fail("scaling phase limits out of range".into());
                }
            }
        }

        Ok(())
    }
}
