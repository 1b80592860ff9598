//! TradeGate — risk-gated arbitrage and swing trading decision engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod indicators;
pub mod venues;
pub mod strategy;
pub mod engine;
pub mod storage;
