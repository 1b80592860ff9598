//! Both strategy loops against one shared ledger.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use tradegate::engine::executor::Executor;
use tradegate::engine::ledger::{LedgerLimits, PortfolioLedger, SharedLedger};
use tradegate::engine::runner::{run_until_stopped, ArbitrageLoop, SwingLoop};
use tradegate::engine::scanner::VenueRouter;
use tradegate::strategy::{ExecutionGate, OpportunityConfig, OpportunityEvaluator, SignalConfig, SignalEvaluator};
use tradegate::types::*;
use tradegate::venues::PriceSource;

use crate::mock_venue::{bullish_snapshot, FixedIndicators, MockExecutor, MockVenue};

fn sol() -> Pair {
    Pair::new("SOL", "USDC")
}

fn make_router(low: Decimal, high: Decimal) -> Arc<VenueRouter> {
    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(MockVenue::new(Venue::Binance, low)),
        Arc::new(MockVenue::new(Venue::Coinbase, high)),
    ];
    Arc::new(VenueRouter::new(sources))
}

fn make_arbitrage(ledger: &SharedLedger, router: &Arc<VenueRouter>, executor: &MockExecutor) -> ArbitrageLoop {
    ArbitrageLoop::new(
        ledger.clone(),
        router.clone(),
        OpportunityEvaluator::new(OpportunityConfig::default()),
        ExecutionGate::new(dec!(0.1), dec!(0.001)),
        Arc::new(Executor::new(Arc::new(executor.clone()))),
        vec![sol()],
        dec!(0.8),
    )
}

#[tokio::test]
async fn test_racing_opens_produce_one_position() {
    let ledger = PortfolioLedger::new(LedgerLimits::default(), dec!(10000)).into_shared();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let side = if i % 2 == 0 { Side::Long } else { Side::Short };
                ledger
                    .lock()
                    .await
                    .open(&sol(), side, dec!(5), dec!(100), &format!("race-{i}"), Strategy::Swing)
            })
        })
        .collect();

    let mut opened = 0;
    for handle in handles {
        if handle.await.unwrap() {
            opened += 1;
        }
    }
    assert_eq!(opened, 1);
    assert_eq!(ledger.lock().await.open_positions().count(), 1);
}

#[tokio::test]
async fn test_in_flight_execution_blocks_second_loop() {
    let ledger = PortfolioLedger::new(LedgerLimits::default(), dec!(10000)).into_shared();
    let router = make_router(dec!(100), dec!(100.2));
    let executor = MockExecutor::new().with_latency(Duration::from_millis(20));

    let mut first = make_arbitrage(&ledger, &router, &executor);
    let mut second = make_arbitrage(&ledger, &router, &executor);

    let now = Utc::now();
    let (a, b) = tokio::join!(first.scan(now), second.scan(now));
    let (a, b) = (a.unwrap(), b.unwrap());

    // The first loop holds the pair while its legs are in flight.
    assert_eq!(a.executed + b.executed, 1);
    assert_eq!(a.rejected + b.rejected, 1);
    assert_eq!(executor.get_receipts().len(), 2);

    let ledger = ledger.lock().await;
    assert_eq!(ledger.closed_positions().len(), 1);
    assert_eq!(ledger.open_positions().count(), 0);
}

#[tokio::test]
async fn test_position_closed_mid_flight_is_not_counted_as_executed() {
    let ledger = PortfolioLedger::new(LedgerLimits::default(), dec!(10000)).into_shared();
    let router = make_router(dec!(100), dec!(100.2));
    let executor = MockExecutor::new().with_latency(Duration::from_millis(20));
    let mut task = make_arbitrage(&ledger, &router, &executor);

    let stopper = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        ledger.lock().await.close(&sol(), dec!(100), CloseReason::StopLoss)
    };
    let (report, stopped) = tokio::join!(task.scan(Utc::now()), stopper);
    let report = report.unwrap();

    assert!(stopped.is_some());
    assert_eq!(report.executed, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(executor.get_receipts().len(), 2);

    let ledger = ledger.lock().await;
    assert_eq!(ledger.closed_positions().len(), 1);
    assert_eq!(ledger.closed_positions()[0].reason, CloseReason::StopLoss);
    assert_eq!(ledger.portfolio_value(), dec!(10000));
}

#[tokio::test]
async fn test_loops_share_ledger_without_losing_pnl() {
    let ledger = PortfolioLedger::new(LedgerLimits::default(), dec!(10000)).into_shared();
    let router = make_router(dec!(100), dec!(100.3));
    let executor = MockExecutor::new().with_latency(Duration::from_millis(1));

    let arbitrage = make_arbitrage(&ledger, &router, &executor);
    let swing = SwingLoop::new(
        ledger.clone(),
        router.clone(),
        SignalEvaluator::new(SignalConfig::default(), Arc::new(FixedIndicators::new(bullish_snapshot(), 2))),
        ExecutionGate::new(dec!(0.5), dec!(0.001)),
        Arc::new(Executor::new(Arc::new(executor.clone()))),
        vec![sol()],
        Venue::Binance,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let tick = Duration::from_millis(3);
    let arbitrage = tokio::spawn(run_until_stopped(arbitrage, tick, tick, stop_rx.clone()));
    let swing = tokio::spawn(run_until_stopped(swing, tick, tick, stop_rx));

    tokio::time::sleep(Duration::from_millis(150)).await;
    stop_tx.send(true).unwrap();
    arbitrage.await.unwrap();
    swing.await.unwrap();

    let ledger = ledger.lock().await;
    assert!(ledger.open_positions().count() <= 1);
    let realized: Decimal = ledger.closed_positions().iter().map(|c| c.realized_pnl).sum();
    assert_eq!(ledger.portfolio_value(), ledger.initial_value() + realized);
    assert!(!executor.get_receipts().is_empty());
}
