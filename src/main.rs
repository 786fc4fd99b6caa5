// src/main.rs
use fx_sim::config::Config;
use fx_sim::domain::errors::{AppError, AppResult};
use fx_sim::domain::models::{OrderRequest, OrderSide};
use fx_sim::market_data::MarketSimulator;
use fx_sim::trading::{EngineEvent, ExecutionEngine, RiskAggregator};

use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting fx_sim v{}", env!("CARGO_PKG_VERSION"));

    let simulator = Arc::new(MarketSimulator::new(config.simulation.clone()));
    let symbol = simulator
        .symbols()
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Config("No symbols to simulate".to_string()))?;

    let history = simulator.generate_historical_series(&symbol, "1h", 100)?;
    if let (Some(first), Some(last)) = (history.first(), history.last()) {
        log::info!(
            "{}: {} hourly bars from {} ({}) to {} ({})",
            symbol,
            history.len(),
            first.timestamp,
            first.open,
            last.timestamp,
            last.close
        );
    }

    // Periodic market tasks
    let mut tasks = simulator.spawn_live_ticks();
    tasks.push(simulator.spawn_regime_rotation());

    let engine = ExecutionEngine::new(Arc::clone(&simulator), config.execution.clone());
    tasks.push(engine.spawn_position_marker());

    let risk = RiskAggregator::new(engine.clone(), Arc::clone(&simulator), config.risk.clone());
    tasks.push(risk.spawn_monitor());

    let subscription = risk.subscribe(|snapshot| {
        log::debug!(
            "Risk update: score {:.1}, equity {}, VaR {}",
            snapshot.metrics.risk_score,
            snapshot.metrics.equity,
            snapshot.metrics.daily_var
        );
    });

    // Log engine events
    let mut events = engine.subscribe();
    tasks.push(tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::PositionClosed(closed) => log::info!(
                    "Trade closed: {} {:?} PnL {}",
                    closed.position.symbol,
                    closed.reason,
                    closed.total_pnl
                ),
                EngineEvent::OrderFilled(order) => {
                    log::info!("Limit order {} filled at {:?}", order.id, order.filled_price)
                }
                other => log::debug!("Engine event: {:?}", other),
            }
        }
    }));

    // Demo trades
    let quote = simulator.bid_ask(&symbol)?;
    let request = OrderRequest::market(&symbol, OrderSide::Buy, dec!(10000))
        .with_leverage(100)
        .with_stop_loss((quote.ask * dec!(0.998)).round_dp(5))
        .with_take_profit((quote.ask * dec!(1.003)).round_dp(5));

    match engine.execute_market_order(request, quote.ask).await {
        Ok(position) => log::info!(
            "Demo position {} opened at {}",
            position.id,
            position.entry_price
        ),
        Err(e) => log::error!("Demo market order failed: {}", e),
    }

    let limit = OrderRequest::limit(
        &symbol,
        OrderSide::Sell,
        dec!(5000),
        (quote.bid * dec!(1.0005)).round_dp(5),
    )
    .with_leverage(50);
    match engine.place_limit_order(limit).await {
        Ok(order) => log::info!("Demo limit order {} waiting at {:?}", order.id, order.limit_price),
        Err(e) => log::error!("Demo limit order failed: {}", e),
    }

    // Account status
    let status_engine = engine.clone();
    tasks.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let positions = status_engine.get_positions();
            if !positions.is_empty() {
                log::info!("=== Current Positions ===");
                for position in positions {
                    log::info!(
                        "{} {}: {} {} @ {}, PnL: {} ({}%)",
                        position.id,
                        position.symbol,
                        position.side,
                        position.size,
                        position.entry_price,
                        position.unrealized_pnl,
                        position.pnl_percent
                    );
                }
            }

            let account = status_engine.get_account_summary();
            log::info!(
                "Balance {} equity {} margin {} free {} level {}%",
                account.balance,
                account.equity,
                account.margin,
                account.free_margin,
                account.margin_level
            );
        }
    }));

    // Wait for shutdown signal
    log::info!("Simulator is running. Press Ctrl+C to stop.");
    ctrl_c().await?;

    // Shutdown
    log::info!("Shutting down...");
    subscription.unsubscribe();
    for task in tasks {
        task.abort();
    }

    for trade in engine.trade_history() {
        log::info!(
            "{} {} closed {:?} with PnL {}",
            trade.position.id,
            trade.position.symbol,
            trade.reason,
            trade.total_pnl
        );
    }

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}
