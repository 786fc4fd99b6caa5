use fx_sim::config::{ExecutionConfig, SimulationConfig};
use fx_sim::domain::errors::TradingError;
use fx_sim::domain::models::{
    CloseReason, MarketRegime, OrderRequest, OrderSide, OrderStatus, PositionStatus, RegimeKind,
};
use fx_sim::market_data::MarketSimulator;
use fx_sim::trading::execution::{slippage_for, MAX_ORDER_SIZE, MIN_ORDER_SIZE};
use fx_sim::trading::{EngineEvent, ExecutionEngine, LimitCheck, MarkOutcome};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn simulator() -> Arc<MarketSimulator> {
    Arc::new(MarketSimulator::new(SimulationConfig {
        symbols: vec!["EUR/USD".to_string(), "USD/JPY".to_string()],
        seed: Some(42),
        demo_calendar: false,
        ..SimulationConfig::default()
    }))
}

fn frictionless() -> ExecutionConfig {
    ExecutionConfig {
        auto_fill_limit_orders: false,
        ..ExecutionConfig::instant()
    }
}

fn setup() -> (Arc<MarketSimulator>, ExecutionEngine<MarketSimulator>) {
    let simulator = simulator();
    let engine = ExecutionEngine::new(Arc::clone(&simulator), frictionless());
    (simulator, engine)
}

fn buy(size: Decimal) -> OrderRequest {
    OrderRequest::market("EUR/USD", OrderSide::Buy, size).with_leverage(10)
}

fn assert_equity_invariant(engine: &ExecutionEngine<MarketSimulator>) {
    let (account, positions) = engine.account_snapshot();
    let unrealized: Decimal = positions.iter().map(|p| p.unrealized_pnl).sum();
    assert_eq!(account.equity, account.balance + unrealized);
}

#[tokio::test]
async fn open_then_close_at_same_price_costs_only_commission() {
    let (_, engine) = setup();

    let position = engine
        .execute_market_order(buy(dec!(10000)), dec!(1.1000))
        .await
        .unwrap();
    assert_eq!(position.entry_price, dec!(1.1000));
    assert_eq!(position.margin, dec!(1100));
    assert_eq!(position.commission, dec!(2.50));
    assert_eq!(engine.get_account_summary().balance, dec!(9997.50));

    let closed = engine.close_position(&position.id, dec!(1.1000)).await.unwrap();
    assert_eq!(closed.price_pnl, Decimal::ZERO);
    assert_eq!(closed.swap, Decimal::ZERO);
    assert_eq!(closed.total_pnl, -closed.commission);
    assert_eq!(closed.reason, CloseReason::Manual);
    assert_eq!(closed.position.status, PositionStatus::Closed);

    let account = engine.get_account_summary();
    assert_eq!(account.balance, dec!(9997.50));
    assert_eq!(account.margin, Decimal::ZERO);
    assert!(engine.get_positions().is_empty());
    assert_eq!(engine.trade_history().len(), 1);
}

#[tokio::test]
async fn equity_tracks_unrealized_pnl() {
    let (_, engine) = setup();

    let long = engine
        .execute_market_order(buy(dec!(10000)), dec!(1.1000))
        .await
        .unwrap();
    let short = engine
        .execute_market_order(
            OrderRequest::market("USD/JPY", OrderSide::Sell, dec!(1000)).with_leverage(100),
            dec!(150.00),
        )
        .await
        .unwrap();
    assert_equity_invariant(&engine);

    let outcome = engine.mark_to_market(&long.id, dec!(1.1050)).await.unwrap();
    match outcome {
        MarkOutcome::Updated(position) => {
            assert_eq!(position.unrealized_pnl, dec!(500));
            assert_eq!(position.current_price, dec!(1.1050));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    engine.mark_to_market(&short.id, dec!(150.10)).await.unwrap();
    assert_equity_invariant(&engine);

    let account = engine.get_account_summary();
    assert_eq!(account.margin, dec!(1100) + dec!(1500));
    assert_eq!(account.free_margin, account.equity - account.margin);

    engine.close_position(&short.id, dec!(150.10)).await.unwrap();
    assert_equity_invariant(&engine);
}

#[tokio::test]
async fn margin_level_is_zero_without_positions() {
    let (_, engine) = setup();

    let account = engine.get_account_summary();
    assert_eq!(account.margin, Decimal::ZERO);
    assert_eq!(account.margin_level, Decimal::ZERO);
    assert_eq!(account.equity, dec!(10000));
}

#[tokio::test]
async fn insufficient_margin_leaves_account_untouched() {
    let (_, engine) = setup();

    let err = engine
        .execute_market_order(
            OrderRequest::market("EUR/USD", OrderSide::Buy, dec!(10000000)),
            dec!(1.1000),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TradingError::InsufficientMargin { .. }));
    assert_eq!(engine.get_account_summary().balance, dec!(10000));
    assert!(engine.get_positions().is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (_, engine) = setup();

    let err = engine
        .execute_market_order(buy(Decimal::ZERO), dec!(1.1000))
        .await
        .unwrap_err();
    assert_eq!(err, TradingError::InvalidSize(Decimal::ZERO));

    let err = engine
        .place_limit_order(OrderRequest::market("EUR/USD", OrderSide::Buy, dec!(1000)))
        .await
        .unwrap_err();
    assert_eq!(err, TradingError::MissingLimitPrice);

    let err = engine.close_position("POS-999999", dec!(1.1)).await.unwrap_err();
    assert_eq!(err, TradingError::PositionNotFound("POS-999999".to_string()));

    let err = engine.cancel_order("ORD-999999").unwrap_err();
    assert_eq!(err, TradingError::OrderNotFound("ORD-999999".to_string()));

    assert!(engine.get_orders().is_empty());
}

#[tokio::test]
async fn sizes_and_prices_outside_bounds_are_rejected() {
    let (_, engine) = setup();

    for size in [Decimal::new(1, 28), Decimal::MAX, MAX_ORDER_SIZE + Decimal::ONE] {
        let err = engine
            .execute_market_order(buy(size), dec!(1.1000))
            .await
            .unwrap_err();
        assert_eq!(err, TradingError::InvalidSize(size));
    }

    let err = engine
        .execute_market_order(buy(dec!(1000)), Decimal::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, TradingError::InvalidOrder(_)));
    assert!(engine.get_positions().is_empty());

    // The smallest size still leaves a well-defined account
    engine
        .execute_market_order(buy(MIN_ORDER_SIZE).with_leverage(1000), dec!(0.6000))
        .await
        .unwrap();
    let account = engine.get_account_summary();
    assert!(account.margin > Decimal::ZERO);
    assert!(account.margin_level > dec!(100));
    assert_equity_invariant(&engine);
}

#[tokio::test]
async fn limit_buy_fills_exactly_once_at_its_limit() {
    let (simulator, engine) = setup();
    simulator.set_price("EUR/USD", 1.1000).unwrap();

    let order = engine
        .place_limit_order(OrderRequest::limit(
            "EUR/USD",
            OrderSide::Buy,
            dec!(10000),
            dec!(1.0990),
        ))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    assert_eq!(engine.check_limit_order(&order.id).await.unwrap(), LimitCheck::Pending);

    simulator.set_price("EUR/USD", 1.0985).unwrap();
    let position = match engine.check_limit_order(&order.id).await.unwrap() {
        LimitCheck::Filled(position) => position,
        other => panic!("expected a fill, got {:?}", other),
    };
    assert_eq!(position.entry_price, dec!(1.0990));

    let filled = engine.get_order(&order.id).unwrap();
    assert_eq!(filled.status, OrderStatus::Filled);
    assert_eq!(filled.filled_price, Some(dec!(1.0990)));
    assert_eq!(filled.position_id, Some(position.id.clone()));

    // Further checks see a terminal order and open nothing new
    assert_eq!(
        engine.check_limit_order(&order.id).await.unwrap(),
        LimitCheck::Inactive(OrderStatus::Filled)
    );
    assert_eq!(engine.get_positions().len(), 1);

    let err = engine.cancel_order(&order.id).unwrap_err();
    assert_eq!(
        err,
        TradingError::OrderNotPending {
            id: order.id.clone(),
            status: OrderStatus::Filled,
        }
    );
}

#[tokio::test]
async fn limit_sell_waits_for_price_at_or_above_limit() {
    let (simulator, engine) = setup();
    simulator.set_price("EUR/USD", 1.1000).unwrap();

    let order = engine
        .place_limit_order(OrderRequest::limit(
            "EUR/USD",
            OrderSide::Sell,
            dec!(5000),
            dec!(1.1010),
        ))
        .await
        .unwrap();
    assert_eq!(engine.check_limit_order(&order.id).await.unwrap(), LimitCheck::Pending);

    simulator.set_price("EUR/USD", 1.1010).unwrap();
    assert!(matches!(
        engine.check_limit_order(&order.id).await.unwrap(),
        LimitCheck::Filled(_)
    ));
}

#[tokio::test]
async fn cancelled_order_never_fills() {
    let (simulator, engine) = setup();
    simulator.set_price("EUR/USD", 1.1000).unwrap();

    let order = engine
        .place_limit_order(OrderRequest::limit(
            "EUR/USD",
            OrderSide::Buy,
            dec!(1000),
            dec!(1.1050),
        ))
        .await
        .unwrap();

    let cancelled = engine.cancel_order(&order.id).unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(engine.cancel_order(&order.id).is_err());

    assert_eq!(
        engine.check_limit_order(&order.id).await.unwrap(),
        LimitCheck::Inactive(OrderStatus::Cancelled)
    );
    assert!(engine.get_positions().is_empty());
}

#[tokio::test]
async fn stale_limit_orders_expire() {
    let simulator = simulator();
    let engine = ExecutionEngine::new(
        Arc::clone(&simulator),
        ExecutionConfig {
            order_lifetime_hours: 0,
            ..frictionless()
        },
    );

    let order = engine
        .place_limit_order(OrderRequest::limit(
            "EUR/USD",
            OrderSide::Buy,
            dec!(1000),
            dec!(0.5000),
        ))
        .await
        .unwrap();

    match engine.check_limit_order(&order.id).await.unwrap() {
        LimitCheck::Expired(expired) => assert_eq!(expired.status, OrderStatus::Cancelled),
        other => panic!("expected expiry, got {:?}", other),
    }
    assert_eq!(engine.get_order(&order.id).unwrap().status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn stop_loss_closes_exactly_once() {
    let (_, engine) = setup();

    let position = engine
        .execute_market_order(buy(dec!(10000)).with_stop_loss(dec!(1.0950)), dec!(1.1000))
        .await
        .unwrap();

    assert!(matches!(
        engine.mark_to_market(&position.id, dec!(1.0980)).await.unwrap(),
        MarkOutcome::Updated(_)
    ));

    let closed = match engine.mark_to_market(&position.id, dec!(1.0940)).await.unwrap() {
        MarkOutcome::AutoClosed(closed) => closed,
        other => panic!("expected auto-close, got {:?}", other),
    };
    assert_eq!(closed.reason, CloseReason::StopLoss);
    assert_eq!(closed.close_price, dec!(1.0940));
    assert_eq!(closed.price_pnl, dec!(-600));
    assert_eq!(closed.total_pnl, dec!(-602.50));

    let err = engine.mark_to_market(&position.id, dec!(1.0900)).await.unwrap_err();
    assert_eq!(err, TradingError::PositionNotFound(position.id.clone()));
    assert_eq!(engine.trade_history().len(), 1);
    assert_eq!(engine.get_account_summary().balance, dec!(10000) - dec!(602.50));
}

#[tokio::test]
async fn take_profit_closes_short() {
    let (_, engine) = setup();

    let position = engine
        .execute_market_order(
            OrderRequest::market("EUR/USD", OrderSide::Sell, dec!(10000))
                .with_leverage(10)
                .with_take_profit(dec!(1.0950)),
            dec!(1.1000),
        )
        .await
        .unwrap();

    match engine.mark_to_market(&position.id, dec!(1.0950)).await.unwrap() {
        MarkOutcome::AutoClosed(closed) => {
            assert_eq!(closed.reason, CloseReason::TakeProfit);
            assert_eq!(closed.price_pnl, dec!(500));
        }
        other => panic!("expected auto-close, got {:?}", other),
    }
}

#[tokio::test]
async fn breached_positions_move_to_closing_on_symbol_marks() {
    let (_, engine) = setup();

    let position = engine
        .execute_market_order(buy(dec!(10000)).with_stop_loss(dec!(1.0950)), dec!(1.1000))
        .await
        .unwrap();

    let breached = engine.mark_symbol("EUR/USD", dec!(1.0900));
    assert_eq!(breached, vec![(position.id.clone(), CloseReason::StopLoss)]);
    assert_eq!(
        engine.get_position(&position.id).unwrap().status,
        PositionStatus::Closing
    );

    // Marks no longer apply and a manual close is refused
    assert!(matches!(
        engine.mark_to_market(&position.id, dec!(1.2000)).await.unwrap(),
        MarkOutcome::Closing(_)
    ));
    assert!(engine.mark_symbol("EUR/USD", dec!(1.0800)).is_empty());
    let err = engine.close_position(&position.id, dec!(1.0900)).await.unwrap_err();
    assert_eq!(
        err,
        TradingError::PositionNotOpen {
            id: position.id.clone(),
            status: PositionStatus::Closing,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn second_close_during_latency_is_refused() {
    let simulator = simulator();
    let engine = ExecutionEngine::new(
        Arc::clone(&simulator),
        ExecutionConfig {
            base_slippage: Decimal::ZERO,
            auto_fill_limit_orders: false,
            ..ExecutionConfig::default()
        },
    );

    let position = engine
        .execute_market_order(buy(dec!(1000)), dec!(1.1000))
        .await
        .unwrap();

    let closer = engine.clone();
    let id = position.id.clone();
    let first = tokio::spawn(async move { closer.close_position(&id, dec!(1.1000)).await });

    // Let the first close start its simulated latency
    tokio::time::sleep(Duration::from_millis(1)).await;

    let err = engine.close_position(&position.id, dec!(1.1000)).await.unwrap_err();
    assert!(matches!(err, TradingError::PositionNotOpen { .. }));

    let closed = first.await.unwrap().unwrap();
    assert_eq!(closed.position.id, position.id);
    assert_eq!(engine.trade_history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn limit_watcher_fills_on_its_own() {
    let simulator = simulator();
    simulator.set_price("EUR/USD", 1.1000).unwrap();
    let engine = ExecutionEngine::new(Arc::clone(&simulator), ExecutionConfig::instant());

    let order = engine
        .place_limit_order(OrderRequest::limit(
            "EUR/USD",
            OrderSide::Buy,
            dec!(1000),
            dec!(1.1020),
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;

    let order = engine.get_order(&order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.filled_price, Some(dec!(1.1020)));
    assert_eq!(engine.get_positions().len(), 1);
}

#[tokio::test]
async fn events_announce_fills_and_closes() {
    let (_, engine) = setup();
    let mut events = engine.subscribe();

    let position = engine
        .execute_market_order(buy(dec!(1000)), dec!(1.1000))
        .await
        .unwrap();
    engine.close_position(&position.id, dec!(1.1010)).await.unwrap();

    match events.try_recv().unwrap() {
        EngineEvent::PositionOpened(opened) => assert_eq!(opened.id, position.id),
        other => panic!("unexpected event {:?}", other),
    }
    match events.try_recv().unwrap() {
        EngineEvent::PositionClosed(closed) => assert_eq!(closed.position.id, position.id),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn reset_restores_demo_baseline() {
    let (_, engine) = setup();

    let position = engine
        .execute_market_order(buy(dec!(10000)), dec!(1.1000))
        .await
        .unwrap();
    engine.close_position(&position.id, dec!(1.0990)).await.unwrap();
    engine
        .execute_market_order(buy(dec!(1000)), dec!(1.1000))
        .await
        .unwrap();
    engine
        .place_limit_order(OrderRequest::limit("EUR/USD", OrderSide::Buy, dec!(1000), dec!(1.05)))
        .await
        .unwrap();

    engine.reset_demo_account();

    let account = engine.get_account_summary();
    assert_eq!(account.balance, dec!(10000));
    assert_eq!(account.equity, dec!(10000));
    assert!(engine.get_positions().is_empty());
    assert!(engine.get_orders().is_empty());
    assert!(engine.trade_history().is_empty());
}

#[tokio::test]
async fn realized_pnl_is_grouped_by_day() {
    let (_, engine) = setup();

    for exit in [dec!(1.1010), dec!(1.0995)] {
        let position = engine
            .execute_market_order(buy(dec!(1000)), dec!(1.1000))
            .await
            .unwrap();
        engine.close_position(&position.id, exit).await.unwrap();
    }

    let days = engine.daily_realized_pnl();
    assert_eq!(days.len(), 1);
    // (+10 - 2.50) + (-5 - 2.50)
    assert_eq!(days[0].1, Decimal::ZERO);
}

#[tokio::test(start_paused = true)]
async fn limit_order_stays_pending_while_its_fill_is_in_flight() {
    let simulator = simulator();
    simulator.set_price("EUR/USD", 1.1000).unwrap();
    let engine = ExecutionEngine::new(
        Arc::clone(&simulator),
        ExecutionConfig {
            auto_fill_limit_orders: false,
            ..ExecutionConfig::default()
        },
    );

    // 1:1 leverage on 1,000,000 needs far more margin than the demo balance
    let order = engine
        .place_limit_order(OrderRequest::limit(
            "EUR/USD",
            OrderSide::Buy,
            dec!(1000000),
            dec!(1.1020),
        ))
        .await
        .unwrap();

    let checker = engine.clone();
    let id = order.id.clone();
    let fill = tokio::spawn(async move { checker.check_limit_order(&id).await });

    // Let the fill start its simulated latency
    tokio::time::sleep(Duration::from_millis(1)).await;

    let in_flight = engine.get_order(&order.id).unwrap();
    assert_eq!(in_flight.status, OrderStatus::Pending);
    assert_eq!(in_flight.filled_price, None);
    assert_eq!(
        engine.cancel_order(&order.id).unwrap_err(),
        TradingError::OrderFilling(order.id.clone())
    );
    assert_eq!(engine.check_limit_order(&order.id).await.unwrap(), LimitCheck::Pending);

    match fill.await.unwrap().unwrap() {
        LimitCheck::Rejected(TradingError::InsufficientMargin { .. }) => {}
        other => panic!("expected a margin rejection, got {:?}", other),
    }
    assert_eq!(engine.get_order(&order.id).unwrap().status, OrderStatus::Rejected);
    assert_eq!(
        engine.cancel_order(&order.id).unwrap_err(),
        TradingError::OrderNotPending {
            id: order.id.clone(),
            status: OrderStatus::Rejected,
        }
    );
    assert!(engine.get_positions().is_empty());
}

#[tokio::test]
async fn closing_slippage_works_against_the_position() {
    let simulator = simulator();
    simulator.set_regime(MarketRegime::new(RegimeKind::Calm, 0.5, 10));
    let config = ExecutionConfig {
        base_slippage: dec!(0.0001),
        ..frictionless()
    };
    let engine = ExecutionEngine::new(Arc::clone(&simulator), config.clone());
    let size = dec!(10000);
    let slip = |quote| slippage_for(&config, size, quote, RegimeKind::Calm, Decimal::ONE);

    let long = engine
        .execute_market_order(buy(size), dec!(1.1000))
        .await
        .unwrap();
    assert_eq!(long.entry_price, dec!(1.1000) + slip(dec!(1.1000)));
    let closed = engine.close_position(&long.id, dec!(1.1000)).await.unwrap();
    assert_eq!(closed.close_price, dec!(1.1000) - slip(dec!(1.1000)));

    let short = engine
        .execute_market_order(
            OrderRequest::market("EUR/USD", OrderSide::Sell, size).with_leverage(10),
            dec!(1.1000),
        )
        .await
        .unwrap();
    assert_eq!(short.entry_price, dec!(1.1000) - slip(dec!(1.1000)));
    let closed = engine.close_position(&short.id, dec!(1.1000)).await.unwrap();
    assert_eq!(closed.close_price, dec!(1.1000) + slip(dec!(1.1000)));

    // Stop-outs fill with twice the slippage
    let stopped = engine
        .execute_market_order(buy(size).with_stop_loss(dec!(1.0950)), dec!(1.1000))
        .await
        .unwrap();
    let closed = match engine.mark_to_market(&stopped.id, dec!(1.0940)).await.unwrap() {
        MarkOutcome::AutoClosed(closed) => closed,
        other => panic!("expected auto-close, got {:?}", other),
    };
    assert_eq!(closed.reason, CloseReason::StopLoss);
    assert_eq!(closed.close_price, dec!(1.0940) - Decimal::TWO * slip(dec!(1.0940)));
}

#[tokio::test]
async fn history_keeps_only_the_latest_entries() {
    let simulator = simulator();
    let engine = ExecutionEngine::new(
        Arc::clone(&simulator),
        ExecutionConfig {
            history_capacity: 2,
            ..frictionless()
        },
    );

    let mut closed_ids = Vec::new();
    for _ in 0..3 {
        let position = engine
            .execute_market_order(buy(dec!(1000)), dec!(1.1000))
            .await
            .unwrap();
        engine.close_position(&position.id, dec!(1.1000)).await.unwrap();
        closed_ids.push(position.id);
    }
    let kept: Vec<String> = engine
        .trade_history()
        .into_iter()
        .map(|closed| closed.position.id)
        .collect();
    assert_eq!(kept, closed_ids[1..].to_vec());

    let mut order_ids = Vec::new();
    for _ in 0..3 {
        let order = engine
            .place_limit_order(OrderRequest::limit(
                "EUR/USD",
                OrderSide::Buy,
                dec!(1000),
                dec!(0.5000),
            ))
            .await
            .unwrap();
        engine.cancel_order(&order.id).unwrap();
        order_ids.push(order.id);
    }
    assert!(engine.get_order(&order_ids[0]).is_none());
    assert_eq!(engine.get_orders().len(), 2);
}
