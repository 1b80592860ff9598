//! TRADEGATE — risk-gated arbitrage and swing trading engine
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the venues, evaluators and ledger together, runs the strategy loops until
//! Ctrl+C (or the configured run length), then writes the run summary.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use tradegate::config;
use tradegate::engine::accountant::Accountant;
use tradegate::engine::executor::Executor;
use tradegate::engine::ledger::{LedgerLimits, PortfolioLedger};
use tradegate::engine::runner::{run_until_stopped, ArbitrageLoop, ScalingLoop, SwingLoop};
use tradegate::engine::scanner::VenueRouter;
use tradegate::indicators::StandardIndicators;
use tradegate::storage;
use tradegate::strategy::{
    ExecutionGate, OpportunityConfig, OpportunityEvaluator, ScalingController, SignalConfig, SignalEvaluator,
};
use tradegate::venues::rest::RestPriceSource;
use tradegate::venues::{PaperExecutor, PriceSource};

const BANNER: &str = r#"
 _____ ____      _    ____  _____ ____    _  _____ _____
|_   _|  _ \    / \  |  _ \| ____/ ___|  / \|_   _| ____|
  | | | |_) |  / _ \ | | | |  _|| |  _  / _ \ | | |  _|
  | | |  _ <  / ___ \| |_| | |__| |_| |/ ___ \| | | |___
  |_| |_| \_\/_/   \_\____/|_____\____/_/   \_\_| |_____|

  Risk-gated arbitrage and swing engine
  v0.1.0 — paper trading
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("TRADEGATE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        mode = %cfg.agent.mode,
        initial_value = %cfg.agent.initial_portfolio_value,
        venues = cfg.enabled_venues().len(),
        "TRADEGATE starting up"
    );

    let started_at = Utc::now();

    // -- Initialise components -------------------------------------------

    let ledger = PortfolioLedger::starting_at(
        LedgerLimits::from(&cfg.risk),
        cfg.agent.initial_portfolio_value,
        started_at,
    )
    .into_shared();

    let mut sources: Vec<Arc<dyn PriceSource>> = Vec::new();
    for venue_cfg in cfg.enabled_venues() {
        sources.push(Arc::new(RestPriceSource::new(venue_cfg.venue)?));
    }
    let router = Arc::new(VenueRouter::new(sources));

    // Paper fills only; live venues are not wired.
    let executor = Arc::new(Executor::new(Arc::new(PaperExecutor::new())));

    let backoff = Duration::from_secs(cfg.agent.error_backoff_secs);
    let (stop_tx, stop_rx) = watch::channel(false);

    let scaling_handle = if cfg.scaling.enabled {
        let controller = ScalingController::from_config(&cfg.scaling, started_at);
        let scaling = ScalingLoop::start(ledger.clone(), controller).await;
        Some(tokio::spawn(run_until_stopped(
            scaling,
            Duration::from_secs(cfg.scaling.check_interval_secs),
            backoff,
            stop_rx.clone(),
        )))
    } else {
        None
    };

    let arbitrage_handle = if cfg.arbitrage.enabled {
        let task = ArbitrageLoop::new(
            ledger.clone(),
            router.clone(),
            OpportunityEvaluator::new(OpportunityConfig::from_app(&cfg)),
            ExecutionGate::new(cfg.arbitrage.gate_min_confidence, cfg.risk.min_arbitrage_profit),
            executor.clone(),
            cfg.arbitrage.pairs.clone(),
            cfg.arbitrage.profit_realization,
        );
        Some(tokio::spawn(run_until_stopped(
            task,
            Duration::from_secs(cfg.arbitrage.scan_interval_secs),
            backoff,
            stop_rx.clone(),
        )))
    } else {
        None
    };

    let swing_handle = if cfg.swing.enabled {
        let indicators = Arc::new(StandardIndicators::new(cfg.indicators.clone()));
        let task = SwingLoop::new(
            ledger.clone(),
            router.clone(),
            SignalEvaluator::new(SignalConfig::from(&cfg.swing), indicators),
            ExecutionGate::new(cfg.swing.actionable_confidence, cfg.risk.min_arbitrage_profit),
            executor.clone(),
            cfg.swing.pairs.clone(),
            cfg.swing.execution_venue,
        );
        Some(tokio::spawn(run_until_stopped(
            task,
            Duration::from_secs(cfg.swing.scan_interval_secs),
            backoff,
            stop_rx.clone(),
        )))
    } else {
        None
    };

    if arbitrage_handle.is_none() && swing_handle.is_none() {
        warn!("Both strategies are disabled; only scaling checks will run");
    }

    // -- Wait for shutdown -----------------------------------------------

    match cfg.agent.run_hours {
        Some(hours) => {
            info!(hours, "Running for a fixed period. Press Ctrl+C to stop early.");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(hours * 3600)) => {
                    info!("Run period elapsed.");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received.");
                }
            }
        }
        None => {
            info!("Engine running. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received.");
        }
    }

    let _ = stop_tx.send(true);

    // Each loop finishes the cycle it is in before handing back.
    if let Some(handle) = arbitrage_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Arbitrage task panicked");
        }
    }
    if let Some(handle) = swing_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Swing task panicked");
        }
    }
    let final_phase = match scaling_handle {
        Some(handle) => match handle.await {
            Ok(scaling) => scaling.phase_number(),
            Err(e) => {
                error!(error = %e, "Scaling task panicked");
                0
            }
        },
        None => 0,
    };

    // -- Summarise -------------------------------------------------------

    let summary = {
        let mut ledger = ledger.lock().await;
        if cfg.agent.liquidate_on_shutdown {
            let closed = ledger.emergency_stop();
            if !closed.is_empty() {
                warn!(count = closed.len(), "Open positions liquidated at shutdown");
            }
        }
        Accountant::summarize(&ledger, final_phase, started_at, Utc::now())
    };

    storage::save_summary(&summary, Some(&cfg.agent.summary_path))?;
    info!(
        value = format!("${:.2}", summary.final_portfolio_value),
        trades = summary.total_trades,
        phase = summary.final_phase,
        "TRADEGATE shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tradegate=info"));

    let json_logging = std::env::var("TRADEGATE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
