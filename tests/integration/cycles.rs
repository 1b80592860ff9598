//! End-to-end strategy cycles against mock venues.
//!
//! Each test drives a real `ArbitrageLoop` or `SwingLoop` one scan at a time
//! and checks what reached the executor and what the ledger booked.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use tradegate::engine::accountant::Accountant;
use tradegate::engine::executor::Executor;
use tradegate::engine::ledger::{LedgerLimits, PortfolioLedger, SharedLedger};
use tradegate::engine::runner::{ArbitrageLoop, SwingLoop};
use tradegate::engine::scanner::VenueRouter;
use tradegate::storage;
use tradegate::strategy::{ExecutionGate, OpportunityConfig, OpportunityEvaluator, SignalConfig, SignalEvaluator};
use tradegate::types::*;
use tradegate::venues::PriceSource;

use crate::mock_venue::{bullish_snapshot, FixedIndicators, MockExecutor, MockVenue};

fn sol() -> Pair {
    Pair::new("SOL", "USDC")
}

fn make_ledger() -> SharedLedger {
    PortfolioLedger::new(LedgerLimits::default(), dec!(10000)).into_shared()
}

struct ArbitrageRig {
    task: ArbitrageLoop,
    ledger: SharedLedger,
    binance: MockVenue,
    coinbase: MockVenue,
    executor: MockExecutor,
    router: Arc<VenueRouter>,
}

fn make_arbitrage_with(config: OpportunityConfig) -> ArbitrageRig {
    let ledger = make_ledger();
    let binance = MockVenue::new(Venue::Binance, dec!(100));
    let coinbase = MockVenue::new(Venue::Coinbase, dec!(100.2));
    let sources: Vec<Arc<dyn PriceSource>> = vec![Arc::new(binance.clone()), Arc::new(coinbase.clone())];
    let router = Arc::new(VenueRouter::new(sources));
    let executor = MockExecutor::new();

    let task = ArbitrageLoop::new(
        ledger.clone(),
        router.clone(),
        OpportunityEvaluator::new(config),
        ExecutionGate::new(dec!(0.1), dec!(0.001)),
        Arc::new(Executor::new(Arc::new(executor.clone()))),
        vec![sol()],
        dec!(0.8),
    );
    ArbitrageRig {
        task,
        ledger,
        binance,
        coinbase,
        executor,
        router,
    }
}

fn make_arbitrage() -> ArbitrageRig {
    make_arbitrage_with(OpportunityConfig::default())
}

// ---------------------------------------------------------------------------
// Arbitrage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_arbitrage_cycle_books_realized_profit() {
    let mut rig = make_arbitrage();
    let report = rig.task.scan(Utc::now()).await.unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.executed, 1);
    assert_eq!(report.rejected + report.failed + report.unhedged, 0);

    // 0.2% spread, confidence 0.2 -> 600 notional -> 6 SOL.
    let receipts = rig.executor.get_receipts();
    assert_eq!(receipts.len(), 2);
    assert_eq!((receipts[0].venue, receipts[0].side), (Venue::Binance, OrderSide::Buy));
    assert_eq!((receipts[1].venue, receipts[1].side), (Venue::Coinbase, OrderSide::Sell));
    assert_eq!(receipts[0].amount, dec!(6));

    let ledger = rig.ledger.lock().await;
    assert!(ledger.position(&sol()).is_none());
    let closed = ledger.closed_positions();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].reason, CloseReason::Manual);
    assert_eq!(closed[0].exit_price, dec!(100.16));
    assert_eq!(closed[0].realized_pnl, dec!(0.96));
    assert_eq!(ledger.portfolio_value(), dec!(10000.96));
    assert_eq!(report.portfolio_value, dec!(10000.96));
}

#[tokio::test]
async fn test_failed_sell_leaves_unhedged_long() {
    let mut rig = make_arbitrage();
    rig.executor.fail_venue(Venue::Coinbase);

    let report = rig.task.scan(Utc::now()).await.unwrap();
    assert_eq!(report.unhedged, 1);
    assert_eq!(report.executed, 0);

    let ledger = rig.ledger.lock().await;
    let position = ledger.position(&sol()).expect("long should stay open");
    assert_eq!(position.side, Side::Long);
    assert_eq!(position.strategy, Strategy::Arbitrage);
    assert_eq!(position.amount, dec!(6));
    assert!(ledger.closed_positions().is_empty());
    assert_eq!(rig.executor.get_receipts().len(), 1);
}

#[tokio::test]
async fn test_unhedged_long_is_stopped_out_later() {
    let mut rig = make_arbitrage();
    rig.executor.fail_venue(Venue::Coinbase);
    rig.task.scan(Utc::now()).await.unwrap();

    // Mean price 96: -4% on the 100 entry.
    rig.binance.set_price(dec!(96));
    rig.coinbase.set_price(dec!(96));
    let report = rig.task.scan(Utc::now()).await.unwrap();
    assert_eq!(report.triggered_exits, 1);
    assert_eq!(report.candidates, 0);

    let ledger = rig.ledger.lock().await;
    assert!(ledger.position(&sol()).is_none());
    let closed = &ledger.closed_positions()[0];
    assert_eq!(closed.reason, CloseReason::StopLoss);
    assert_eq!(closed.realized_pnl, dec!(-24));
    assert_eq!(ledger.portfolio_value(), dec!(9976));
}

#[tokio::test]
async fn test_failed_buy_reverts_open() {
    let mut rig = make_arbitrage();
    rig.executor.fail_venue(Venue::Binance);

    let report = rig.task.scan(Utc::now()).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.unhedged, 0);

    let ledger = rig.ledger.lock().await;
    let m = ledger.metrics();
    assert_eq!(m.open_positions, 0);
    assert_eq!(m.total_closed, 0);
    assert_eq!(m.daily_trades, 0);
    assert_eq!(ledger.portfolio_value(), dec!(10000));
    assert!(rig.executor.get_receipts().is_empty());
}

#[tokio::test]
async fn test_fourth_candidate_in_window_is_throttled() {
    let mut rig = make_arbitrage();
    let now = Utc::now();

    for _ in 0..3 {
        let report = rig.task.scan(now).await.unwrap();
        assert_eq!(report.executed, 1);
    }
    let report = rig.task.scan(now).await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.executed, 0);

    // A minute later the window has drained.
    let later = now + chrono::Duration::seconds(61);
    assert_eq!(rig.task.scan(later).await.unwrap().executed, 1);
    assert_eq!(rig.ledger.lock().await.closed_positions().len(), 4);
}

#[tokio::test]
async fn test_burst_cap_applies_within_one_cycle() {
    let ledger = make_ledger();
    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(MockVenue::new(Venue::Binance, dec!(100))),
        Arc::new(MockVenue::new(Venue::Coinbase, dec!(100.5))),
        Arc::new(MockVenue::new(Venue::Kraken, dec!(101))),
        Arc::new(MockVenue::new(Venue::CoinGecko, dec!(101.5))),
    ];
    let executor = MockExecutor::new();
    let config = OpportunityConfig {
        top_k: 4,
        ..OpportunityConfig::default()
    };
    let mut task = ArbitrageLoop::new(
        ledger.clone(),
        Arc::new(VenueRouter::new(sources)),
        OpportunityEvaluator::new(config),
        ExecutionGate::new(dec!(0.1), dec!(0.001)),
        Arc::new(Executor::new(Arc::new(executor.clone()))),
        vec![sol()],
        dec!(0.8),
    );

    // Four candidates in one scan: the first three fill the burst window,
    // only the fourth is throttled.
    let report = task.scan(Utc::now()).await.unwrap();
    assert_eq!(report.candidates, 4);
    assert_eq!(report.executed, 3);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.failed + report.unhedged, 0);

    assert_eq!(executor.get_receipts().len(), 6);
    let ledger = ledger.lock().await;
    assert_eq!(ledger.closed_positions().len(), 3);
    // Widest spread first: Binance 100 -> CoinGecko 101.5.
    assert_eq!(ledger.closed_positions()[0].exit_price, dec!(101.2));
    assert!(ledger.position(&sol()).is_none());
}

#[tokio::test]
async fn test_liquidity_scales_confidence_and_size() {
    let ledger = make_ledger();
    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(MockVenue::new(Venue::Binance, dec!(100)).with_liquidity(dec!(100000))),
        Arc::new(MockVenue::new(Venue::Kraken, dec!(100.2)).with_liquidity(dec!(100000))),
    ];
    let executor = MockExecutor::new();
    let mut task = ArbitrageLoop::new(
        ledger.clone(),
        Arc::new(VenueRouter::new(sources)),
        OpportunityEvaluator::new(OpportunityConfig::default()),
        ExecutionGate::new(dec!(0.1), dec!(0.001)),
        Arc::new(Executor::new(Arc::new(executor.clone()))),
        vec![sol()],
        dec!(0.8),
    );

    let report = task.scan(Utc::now()).await.unwrap();
    assert_eq!(report.executed, 1);
    // Confidence 1.0 * (0.002 / 0.005) = 0.4 -> 1200 notional.
    assert_eq!(executor.get_receipts()[0].amount, dec!(12));
    assert_eq!(executor.get_receipts()[1].venue, Venue::Kraken);
}

#[tokio::test]
async fn test_fees_wipe_out_thin_spread() {
    let mut config = OpportunityConfig::default();
    config.fees.insert(Venue::Binance, dec!(0.001));
    config.fees.insert(Venue::Coinbase, dec!(0.004));
    let mut rig = make_arbitrage_with(config);

    let report = rig.task.scan(Utc::now()).await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.rejected, 1);
    assert!(rig.executor.get_receipts().is_empty());
}

#[tokio::test]
async fn test_unavailable_venue_skips_pair() {
    let mut rig = make_arbitrage();
    rig.coinbase.set_error("timeout");

    for _ in 0..3 {
        let report = rig.task.scan(Utc::now()).await.unwrap();
        assert_eq!(report.pairs_scanned, 1);
        assert_eq!(report.candidates, 0);
    }
    assert_eq!(rig.router.starved_cycles(&sol()), 3);

    rig.coinbase.clear_error();
    assert_eq!(rig.task.scan(Utc::now()).await.unwrap().executed, 1);
    assert_eq!(rig.router.starved_cycles(&sol()), 0);
}

#[tokio::test]
async fn test_circuit_breaker_blocks_new_entries() {
    let mut rig = make_arbitrage();
    {
        let mut ledger = rig.ledger.lock().await;
        let eth = Pair::new("ETH", "USDC");
        ledger.open(&eth, Side::Long, dec!(1), dec!(2000), "loser", Strategy::Swing);
        // -600 against a 5% limit on ~9400
        ledger.close(&eth, dec!(1400), CloseReason::StopLoss);
    }

    let report = rig.task.scan(Utc::now()).await.unwrap();
    assert_eq!(report.rejected, 1);
    assert_eq!(report.executed, 0);
    assert!(rig.executor.get_receipts().is_empty());
}

#[tokio::test]
async fn test_run_summary_after_cycles() {
    let mut rig = make_arbitrage();
    let started_at = Utc::now();
    rig.task.scan(started_at).await.unwrap();
    rig.task.scan(started_at).await.unwrap();

    let summary = {
        let ledger = rig.ledger.lock().await;
        Accountant::summarize(&ledger, 1, started_at, Utc::now())
    };
    assert_eq!(summary.total_trades, 2);
    assert_eq!(summary.winning_trades, 2);
    assert_eq!(summary.win_rate, Decimal::ONE);
    assert!(summary.total_return > Decimal::ZERO);

    let mut path = std::env::temp_dir();
    path.push(format!("tradegate_it_summary_{}.json", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();
    storage::save_summary(&summary, Some(&path)).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["totalTrades"], 2);
    assert_eq!(raw["finalPhase"], 1);
    assert_eq!(raw["trades"][0]["reason"], "manual");
    assert_eq!(raw["trades"][0]["strategy"], "arbitrage");

    let loaded = storage::load_summary(Some(&path)).unwrap().unwrap();
    assert_eq!(loaded.final_portfolio_value, summary.final_portfolio_value);
    std::fs::remove_file(&path).unwrap();
}

// ---------------------------------------------------------------------------
// Swing
// ---------------------------------------------------------------------------

struct SwingRig {
    task: SwingLoop,
    ledger: SharedLedger,
    binance: MockVenue,
    coinbase: MockVenue,
    executor: MockExecutor,
    indicators: Arc<FixedIndicators>,
}

fn make_swing() -> SwingRig {
    let ledger = make_ledger();
    let binance = MockVenue::new(Venue::Binance, dec!(100));
    let coinbase = MockVenue::new(Venue::Coinbase, dec!(100));
    let sources: Vec<Arc<dyn PriceSource>> = vec![Arc::new(binance.clone()), Arc::new(coinbase.clone())];
    let executor = MockExecutor::new();
    let indicators = Arc::new(FixedIndicators::new(bullish_snapshot(), 3));

    let task = SwingLoop::new(
        ledger.clone(),
        Arc::new(VenueRouter::new(sources)),
        SignalEvaluator::new(SignalConfig::default(), indicators.clone()),
        ExecutionGate::new(dec!(0.5), dec!(0.001)),
        Arc::new(Executor::new(Arc::new(executor.clone()))),
        vec![sol()],
        Venue::Binance,
    );
    SwingRig {
        task,
        ledger,
        binance,
        coinbase,
        executor,
        indicators,
    }
}

#[tokio::test]
async fn test_swing_waits_for_lookback_then_enters_long() {
    let mut rig = make_swing();
    let now = Utc::now();

    for _ in 0..2 {
        let report = rig.task.scan(now).await.unwrap();
        assert_eq!(report.candidates, 0);
    }
    assert_eq!(rig.task.evaluator().history_len(&sol()), 2);

    let report = rig.task.scan(now).await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.executed, 1);

    // Confidence saturates at 1.0: 30% of 10000 at 100.
    let ledger = rig.ledger.lock().await;
    let position = ledger.position(&sol()).unwrap();
    assert_eq!(position.side, Side::Long);
    assert_eq!(position.strategy, Strategy::Swing);
    assert_eq!(position.amount, dec!(30));

    let receipts = rig.executor.get_receipts();
    assert_eq!(receipts.len(), 1);
    assert_eq!((receipts[0].venue, receipts[0].side), (Venue::Binance, OrderSide::Buy));
}

#[tokio::test]
async fn test_swing_entry_uses_execution_venue_quote() {
    let mut rig = make_swing();
    // Mean 101 drives the indicators; the fill happens on Binance at 100.
    rig.coinbase.set_price(dec!(102));
    let now = Utc::now();
    for _ in 0..3 {
        rig.task.scan(now).await.unwrap();
    }

    let ledger = rig.ledger.lock().await;
    let position = ledger.position(&sol()).unwrap();
    assert_eq!(position.entry_price, dec!(100));
    assert_eq!(position.amount, dec!(30));

    let receipts = rig.executor.get_receipts();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].venue, Venue::Binance);
    assert_eq!(receipts[0].price, dec!(100));
}

#[tokio::test]
async fn test_swing_take_profit_closes_without_an_order() {
    let mut rig = make_swing();
    let now = Utc::now();
    for _ in 0..3 {
        rig.task.scan(now).await.unwrap();
    }

    // Neutral indicators so nothing re-enters after the exit.
    rig.indicators.set(IndicatorSnapshot::default());
    rig.binance.set_price(dec!(106));
    rig.coinbase.set_price(dec!(106));
    let report = rig.task.scan(now).await.unwrap();
    assert_eq!(report.triggered_exits, 1);
    assert_eq!(report.executed, 0);

    let ledger = rig.ledger.lock().await;
    let closed = &ledger.closed_positions()[0];
    assert_eq!(closed.reason, CloseReason::TakeProfit);
    assert_eq!(closed.realized_pnl, dec!(180));
    assert_eq!(ledger.portfolio_value(), dec!(10180));
    // Only the entry reached the executor.
    assert_eq!(rig.executor.get_receipts().len(), 1);
}

#[tokio::test]
async fn test_swing_short_entry_sells() {
    let mut rig = make_swing();
    rig.indicators.set(IndicatorSnapshot {
        oscillator: 80.0,
        ema_short: 99.0,
        ema_long: 100.0,
        momentum: -1.0,
        momentum_baseline: -0.8,
        long_average: 110.0,
    });
    let now = Utc::now();
    for _ in 0..3 {
        rig.task.scan(now).await.unwrap();
    }

    let ledger = rig.ledger.lock().await;
    assert_eq!(ledger.position(&sol()).unwrap().side, Side::Short);
    assert_eq!(rig.executor.get_receipts()[0].side, OrderSide::Sell);
}

#[tokio::test]
async fn test_swing_failed_entry_reverts() {
    let mut rig = make_swing();
    rig.executor.fail_venue(Venue::Binance);
    let now = Utc::now();
    let mut failed = 0;
    for _ in 0..3 {
        failed += rig.task.scan(now).await.unwrap().failed;
    }
    assert_eq!(failed, 1);
    assert!(rig.ledger.lock().await.position(&sol()).is_none());
}

#[tokio::test]
async fn test_swing_throttle_allows_two_per_hour() {
    let mut rig = make_swing();
    let now = Utc::now();
    for _ in 0..3 {
        rig.task.scan(now).await.unwrap();
    }

    // Close the open long by hand so the pair is free each time.
    let mut executed = 0;
    let mut rejected = 0;
    for _ in 0..2 {
        rig.ledger.lock().await.close(&sol(), dec!(100), CloseReason::Manual);
        let report = rig.task.scan(now).await.unwrap();
        executed += report.executed;
        rejected += report.rejected;
    }
    // Signals 2 and 3 in the hour: the second passes, the third is throttled.
    assert_eq!(executed, 1);
    assert_eq!(rejected, 1);
}
