// src/trading/execution.rs
use crate::config::{ExecutionConfig, SwapPolicy};
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::{
    AccountSummary, CloseReason, ClosedPosition, Order, OrderKind, OrderRequest, OrderSide,
    OrderStatus, Position, PositionStatus, RegimeKind,
};
use crate::market_data::PriceFeed;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Smallest accepted order size, in base-currency units
pub const MIN_ORDER_SIZE: Decimal = dec!(0.01);
/// Largest accepted order size, in base-currency units
pub const MAX_ORDER_SIZE: Decimal = dec!(1000000000);
/// Quoted and limit prices above this are rejected
pub const MAX_QUOTE_PRICE: Decimal = dec!(1000000);

/// Everything the engine announces to observers
#[derive(Debug, Clone)]
pub enum EngineEvent {
    PositionOpened(Position),
    PositionClosed(ClosedPosition),
    OrderPlaced(Order),
    OrderFilled(Order),
    OrderCancelled(Order),
    OrderExpired(Order),
    OrderRejected { order: Order, reason: String },
    AccountReset { balance: Decimal },
}

/// Result of marking one position to market
#[derive(Debug, Clone, PartialEq)]
pub enum MarkOutcome {
    /// Price applied, bounds intact
    Updated(Position),
    /// Already on its way out; the mark was ignored
    Closing(Position),
    /// The mark breached stop-loss or take-profit and the position was closed
    AutoClosed(ClosedPosition),
}

/// Result of one fill check of a limit order
#[derive(Debug, Clone, PartialEq)]
pub enum LimitCheck {
    Pending,
    Filled(Position),
    Expired(Order),
    Rejected(TradingError),
    /// The order had already left `Pending`
    Inactive(OrderStatus),
}

/// Balance and open positions, guarded together so margin checks and fills are atomic
struct Book {
    balance: Decimal,
    positions: HashMap<String, Position>,
    history: VecDeque<ClosedPosition>,
    capacity: usize,
}

impl Book {
    fn new(balance: Decimal, capacity: usize) -> Self {
        Self {
            balance,
            positions: HashMap::new(),
            history: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn used_margin(&self) -> Decimal {
        self.positions
            .values()
            .fold(Decimal::ZERO, |total, p| total.saturating_add(p.margin))
    }

    fn equity(&self) -> Decimal {
        self.positions
            .values()
            .fold(self.balance, |total, p| total.saturating_add(p.unrealized_pnl))
    }

    fn summary(&self) -> AccountSummary {
        let margin = self.used_margin();
        let equity = self.equity();

        AccountSummary {
            balance: self.balance,
            equity,
            margin,
            free_margin: equity.saturating_sub(margin),
            margin_level: margin_level(equity, margin),
        }
    }

    fn record(&mut self, closed: ClosedPosition) {
        self.history.push_back(closed);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    fn sorted_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        positions
    }
}

/// Orders by id. An id in `filling` has a fill in flight and is still `Pending`.
struct OrderBook {
    entries: HashMap<String, Order>,
    filling: HashSet<String>,
    finished: VecDeque<String>,
    capacity: usize,
}

impl OrderBook {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            filling: HashSet::new(),
            finished: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Note that `order_id` reached a terminal status, forgetting the oldest
    /// terminal orders past capacity
    fn retire(&mut self, order_id: &str) {
        self.finished.push_back(order_id.to_string());
        while self.finished.len() > self.capacity {
            if let Some(oldest) = self.finished.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Simulated brokerage: fills orders against a price feed and keeps the
/// account's positions, orders and balance.
pub struct ExecutionEngine<F: PriceFeed> {
    feed: Arc<F>,
    config: Arc<ExecutionConfig>,
    book: Arc<Mutex<Book>>,
    orders: Arc<Mutex<OrderBook>>,
    sequence: Arc<AtomicU64>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl<F: PriceFeed> Clone for ExecutionEngine<F> {
    fn clone(&self) -> Self {
        Self {
            feed: Arc::clone(&self.feed),
            config: Arc::clone(&self.config),
            book: Arc::clone(&self.book),
            orders: Arc::clone(&self.orders),
            sequence: Arc::clone(&self.sequence),
            event_tx: self.event_tx.clone(),
        }
    }
}

impl<F: PriceFeed + 'static> ExecutionEngine<F> {
    /// Create an engine holding the configured demo balance
    pub fn new(feed: Arc<F>, config: ExecutionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            feed,
            book: Arc::new(Mutex::new(Book::new(
                config.initial_balance,
                config.history_capacity,
            ))),
            orders: Arc::new(Mutex::new(OrderBook::new(config.history_capacity))),
            config: Arc::new(config),
            sequence: Arc::new(AtomicU64::new(0)),
            event_tx,
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Fill `request` immediately at `quoted_price` plus slippage.
    ///
    /// Completes after the simulated execution latency.
    pub async fn execute_market_order(
        &self,
        request: OrderRequest,
        quoted_price: Decimal,
    ) -> TradingResult<Position> {
        validate_request(&request)?;
        validate_price("Quoted", quoted_price)?;

        let regime = self.feed.current_regime().kind;
        self.simulate_latency(regime).await;

        let position = self.open_position(&request, quoted_price, regime)?;

        log::info!(
            "Opened {} {} {} @ {} (margin {}, commission {})",
            position.id,
            position.side,
            position.symbol,
            position.entry_price,
            position.margin,
            position.commission
        );
        self.publish(EngineEvent::PositionOpened(position.clone()));

        Ok(position)
    }

    /// Register a pending limit order; it fills asynchronously once marketable
    pub async fn place_limit_order(&self, request: OrderRequest) -> TradingResult<Order> {
        validate_request(&request)?;
        let limit_price = request.limit_price.ok_or(TradingError::MissingLimitPrice)?;
        validate_price("Limit", limit_price)?;

        let order = Order {
            id: self.next_id("ORD"),
            symbol: request.symbol,
            side: request.side,
            kind: OrderKind::Limit,
            size: request.size,
            limit_price: Some(limit_price),
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            leverage: request.leverage,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            filled_at: None,
            filled_price: None,
            position_id: None,
        };

        self.orders.lock().entries.insert(order.id.clone(), order.clone());

        log::info!(
            "Placed {} LIMIT {} {} {} @ {}",
            order.id,
            order.side,
            order.size,
            order.symbol,
            limit_price
        );
        self.publish(EngineEvent::OrderPlaced(order.clone()));

        if self.config.auto_fill_limit_orders {
            self.spawn_limit_watcher(order.id.clone());
        }

        Ok(order)
    }

    /// Check one pending limit order against the live price, filling or expiring it
    pub async fn check_limit_order(&self, order_id: &str) -> TradingResult<LimitCheck> {
        let order = {
            let orders = self.orders.lock();
            let order = orders
                .entries
                .get(order_id)
                .cloned()
                .ok_or_else(|| TradingError::OrderNotFound(order_id.to_string()))?;
            if orders.filling.contains(order_id) {
                return Ok(LimitCheck::Pending);
            }
            order
        };

        if order.status != OrderStatus::Pending {
            return Ok(LimitCheck::Inactive(order.status));
        }

        if Utc::now() - order.created_at >= self.config.order_lifetime() {
            return Ok(self.expire_order(order_id));
        }

        let limit_price = order.limit_price.ok_or(TradingError::MissingLimitPrice)?;
        let price = self.feed.latest_price(&order.symbol).await?;
        if !order.is_marketable(price) {
            return Ok(LimitCheck::Pending);
        }

        // Claim the fill; the order stays pending until it settles
        {
            let mut orders = self.orders.lock();
            let status = orders.entries.get(order_id).map(|o| o.status);
            match status {
                Some(OrderStatus::Pending) => {
                    if !orders.filling.insert(order_id.to_string()) {
                        return Ok(LimitCheck::Pending);
                    }
                }
                Some(status) => return Ok(LimitCheck::Inactive(status)),
                None => return Err(TradingError::OrderNotFound(order_id.to_string())),
            }
        }

        match self.execute_market_order(order.fill_request(), limit_price).await {
            Ok(position) => {
                let filled = self.settle_order(order_id, |o| {
                    o.status = OrderStatus::Filled;
                    o.filled_at = Some(Utc::now());
                    o.filled_price = Some(position.entry_price);
                    o.position_id = Some(position.id.clone());
                });
                if let Some(filled) = filled {
                    log::info!(
                        "Filled {} at {} (market {})",
                        filled.id,
                        position.entry_price,
                        price
                    );
                    self.publish(EngineEvent::OrderFilled(filled));
                }
                Ok(LimitCheck::Filled(position))
            }
            Err(e) => {
                let rejected = self.settle_order(order_id, |o| o.status = OrderStatus::Rejected);
                log::warn!("Limit order {} rejected on fill: {}", order_id, e);
                if let Some(order) = rejected {
                    self.publish(EngineEvent::OrderRejected {
                        order,
                        reason: e.to_string(),
                    });
                }
                Ok(LimitCheck::Rejected(e))
            }
        }
    }

    /// Cancel a pending order; fails while a fill is in flight and once the
    /// order has reached a terminal status
    pub fn cancel_order(&self, order_id: &str) -> TradingResult<Order> {
        let cancelled = {
            let mut orders = self.orders.lock();
            if orders.filling.contains(order_id) {
                return Err(TradingError::OrderFilling(order_id.to_string()));
            }
            let order = orders
                .entries
                .get_mut(order_id)
                .ok_or_else(|| TradingError::OrderNotFound(order_id.to_string()))?;

            if order.status != OrderStatus::Pending {
                return Err(TradingError::OrderNotPending {
                    id: order_id.to_string(),
                    status: order.status,
                });
            }
            order.status = OrderStatus::Cancelled;
            let cancelled = order.clone();
            orders.retire(order_id);
            cancelled
        };

        log::info!("Cancelled {}", order_id);
        self.publish(EngineEvent::OrderCancelled(cancelled.clone()));

        Ok(cancelled)
    }

    /// Close an open position at `quoted_price` minus closing slippage
    pub async fn close_position(
        &self,
        position_id: &str,
        quoted_price: Decimal,
    ) -> TradingResult<ClosedPosition> {
        validate_price("Quoted", quoted_price)?;

        {
            let mut book = self.book.lock();
            let position = book
                .positions
                .get_mut(position_id)
                .ok_or_else(|| TradingError::PositionNotFound(position_id.to_string()))?;

            if !position.is_open() {
                return Err(TradingError::PositionNotOpen {
                    id: position_id.to_string(),
                    status: position.status,
                });
            }
            position.status = PositionStatus::Closing;
        }

        self.finish_close(position_id, quoted_price, CloseReason::Manual)
            .await
    }

    /// Apply `current_price` to one position, closing it if a bound is breached
    pub async fn mark_to_market(
        &self,
        position_id: &str,
        current_price: Decimal,
    ) -> TradingResult<MarkOutcome> {
        let reason = {
            let mut book = self.book.lock();
            let position = book
                .positions
                .get_mut(position_id)
                .ok_or_else(|| TradingError::PositionNotFound(position_id.to_string()))?;

            match self.apply_mark(position, current_price, Utc::now()) {
                Some(reason) => reason,
                None if position.is_open() => return Ok(MarkOutcome::Updated(position.clone())),
                None => return Ok(MarkOutcome::Closing(position.clone())),
            }
        };

        log::info!(
            "{} breached {:?} at {}, closing",
            position_id,
            reason,
            current_price
        );
        let closed = self
            .finish_close(position_id, current_price, reason)
            .await?;

        Ok(MarkOutcome::AutoClosed(closed))
    }

    /// Mark every open position on `symbol`.
    ///
    /// Breached positions move to `Closing`; the caller finishes them.
    pub fn mark_symbol(&self, symbol: &str, current_price: Decimal) -> Vec<(String, CloseReason)> {
        let now = Utc::now();
        let mut book = self.book.lock();

        book.positions
            .values_mut()
            .filter(|p| p.symbol == symbol)
            .filter_map(|p| {
                self.apply_mark(p, current_price, now)
                    .map(|reason| (p.id.clone(), reason))
            })
            .collect()
    }

    /// Mark positions from the feed's live ticks, spawning auto-closes
    pub fn spawn_position_marker(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let mut ticks = self.feed.live_ticks();

        tokio::spawn(async move {
            loop {
                let tick = match ticks.recv().await {
                    Ok(tick) => tick,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Position marker lagged, skipped {} ticks", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let price = tick.candle.close;
                for (position_id, reason) in engine.mark_symbol(&tick.symbol, price) {
                    log::info!(
                        "{} breached {:?} at {}, closing",
                        position_id,
                        reason,
                        price
                    );
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = engine.finish_close(&position_id, price, reason).await {
                            log::error!("Auto-close of {} failed: {}", position_id, e);
                        }
                    });
                }
            }
        })
    }

    pub fn get_positions(&self) -> Vec<Position> {
        self.book.lock().sorted_positions()
    }

    pub fn get_position(&self, position_id: &str) -> Option<Position> {
        self.book.lock().positions.get(position_id).cloned()
    }

    /// All orders the engine knows about, oldest first
    pub fn get_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.lock().entries.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.orders.lock().entries.get(order_id).cloned()
    }

    pub fn get_account_summary(&self) -> AccountSummary {
        self.book.lock().summary()
    }

    /// Account summary and open positions taken under one lock
    pub fn account_snapshot(&self) -> (AccountSummary, Vec<Position>) {
        let book = self.book.lock();
        (book.summary(), book.sorted_positions())
    }

    /// Closed positions still retained, oldest first
    pub fn trade_history(&self) -> Vec<ClosedPosition> {
        self.book.lock().history.iter().cloned().collect()
    }

    /// Realised P&L per UTC day of closing, over the retained history
    pub fn daily_realized_pnl(&self) -> Vec<(NaiveDate, Decimal)> {
        let book = self.book.lock();
        let mut days: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for trade in &book.history {
            let day = days.entry(trade.closed_at.date_naive()).or_default();
            *day = day.saturating_add(trade.total_pnl);
        }
        days.into_iter().collect()
    }

    /// Back to the demo baseline: initial balance, no positions, no orders
    pub fn reset_demo_account(&self) {
        let balance = self.config.initial_balance;
        *self.book.lock() = Book::new(balance, self.config.history_capacity);
        *self.orders.lock() = OrderBook::new(self.config.history_capacity);

        log::info!("Demo account reset to {}", balance);
        self.publish(EngineEvent::AccountReset { balance });
    }

    fn open_position(
        &self,
        request: &OrderRequest,
        quoted_price: Decimal,
        regime: RegimeKind,
    ) -> TradingResult<Position> {
        let slippage =
            slippage_for(&self.config, request.size, quoted_price, regime, Decimal::ONE);
        let execution_price = quoted_price + request.side.sign() * slippage;
        let trade_value = request
            .size
            .checked_mul(execution_price)
            .ok_or(TradingError::InvalidSize(request.size))?;
        let margin = trade_value / Decimal::from(request.leverage);
        let commission = commission_for(&self.config, trade_value);

        let mut book = self.book.lock();
        let available = book.summary().free_margin;
        if margin > available {
            return Err(TradingError::InsufficientMargin {
                required: margin,
                available,
            });
        }

        book.balance -= commission;

        let position = Position {
            id: self.next_id("POS"),
            symbol: request.symbol.clone(),
            side: request.side,
            size: request.size,
            entry_price: execution_price,
            current_price: execution_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            leverage: request.leverage,
            margin,
            unrealized_pnl: Decimal::ZERO,
            pnl_percent: Decimal::ZERO,
            swap: Decimal::ZERO,
            commission,
            opened_at: Utc::now(),
            status: PositionStatus::Open,
        };
        book.positions.insert(position.id.clone(), position.clone());

        Ok(position)
    }

    /// Update price, P&L and swap of an open position.
    ///
    /// Moves it to `Closing` and returns the reason when a bound is crossed.
    fn apply_mark(
        &self,
        position: &mut Position,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Option<CloseReason> {
        if !position.is_open() {
            return None;
        }

        position.calculate_pnl(price);
        position.swap = swap_for(&self.config.swap, position, now);

        let reason = position.breach(price)?;
        position.status = PositionStatus::Closing;
        Some(reason)
    }

    /// Settle a position already marked `Closing` and drop it from the book
    async fn finish_close(
        &self,
        position_id: &str,
        quoted_price: Decimal,
        reason: CloseReason,
    ) -> TradingResult<ClosedPosition> {
        let regime = self.feed.current_regime().kind;
        self.simulate_latency(regime).await;

        let closed = {
            let mut book = self.book.lock();
            let mut position = book
                .positions
                .remove(position_id)
                .ok_or_else(|| TradingError::PositionNotFound(position_id.to_string()))?;

            // Adverse moves fill worse
            let multiplier = if reason == CloseReason::StopLoss {
                Decimal::TWO
            } else {
                Decimal::ONE
            };
            let slippage =
                slippage_for(&self.config, position.size, quoted_price, regime, multiplier);
            let close_price = quoted_price - position.side.sign() * slippage;

            let closed_at = Utc::now();
            let price_pnl = position.price_pnl(close_price);
            let swap = swap_for(&self.config.swap, &position, closed_at);
            let commission = position.commission;
            let total_pnl = price_pnl.saturating_add(swap).saturating_sub(commission);

            // Commission was taken when the position opened
            book.balance = book.balance.saturating_add(price_pnl.saturating_add(swap));

            position.current_price = close_price;
            position.unrealized_pnl = Decimal::ZERO;
            position.swap = swap;
            position.status = PositionStatus::Closed;

            let closed = ClosedPosition {
                position,
                close_price,
                price_pnl,
                swap,
                commission,
                total_pnl,
                reason,
                closed_at,
            };
            book.record(closed.clone());
            closed
        };

        log::info!(
            "Closed {} {:?} @ {} total PnL {}",
            closed.position.id,
            closed.reason,
            closed.close_price,
            closed.total_pnl
        );
        self.publish(EngineEvent::PositionClosed(closed.clone()));

        Ok(closed)
    }

    fn expire_order(&self, order_id: &str) -> LimitCheck {
        let expired = {
            let mut orders = self.orders.lock();
            if orders.filling.contains(order_id) {
                return LimitCheck::Pending;
            }
            let expired = match orders.entries.get_mut(order_id) {
                Some(o) if o.status == OrderStatus::Pending => {
                    o.status = OrderStatus::Cancelled;
                    o.clone()
                }
                Some(o) => return LimitCheck::Inactive(o.status),
                None => return LimitCheck::Inactive(OrderStatus::Cancelled),
            };
            orders.retire(order_id);
            expired
        };

        log::info!("Limit order {} expired unfilled", order_id);
        self.publish(EngineEvent::OrderExpired(expired.clone()));
        LimitCheck::Expired(expired)
    }

    /// Release the fill claim on `order_id` and write its terminal status
    fn settle_order(&self, order_id: &str, f: impl FnOnce(&mut Order)) -> Option<Order> {
        let mut orders = self.orders.lock();
        orders.filling.remove(order_id);
        let order = orders.entries.get_mut(order_id)?;
        f(order);
        let settled = order.clone();
        orders.retire(order_id);
        Some(settled)
    }

    /// Poll one limit order until it leaves `Pending`
    fn spawn_limit_watcher(&self, order_id: String) -> JoinHandle<()> {
        let engine = self.clone();
        let period = self.config.limit_poll_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                match engine.check_limit_order(&order_id).await {
                    Ok(LimitCheck::Pending) => continue,
                    Ok(outcome) => {
                        log::debug!("Watcher for {} done: {:?}", order_id, outcome);
                        break;
                    }
                    Err(e) => {
                        log::warn!("Watcher for {} stopped: {}", order_id, e);
                        break;
                    }
                }
            }
        })
    }

    async fn simulate_latency(&self, regime: RegimeKind) {
        let delay = execution_delay(&self.config, regime);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{:06}", prefix, seq)
    }

    fn publish(&self, event: EngineEvent) {
        // Nobody listening is not an error
        let _ = self.event_tx.send(event);
    }
}

fn validate_request(request: &OrderRequest) -> TradingResult<()> {
    if request.symbol.trim().is_empty() {
        return Err(TradingError::InvalidOrder("Symbol is required".to_string()));
    }
    if request.size < MIN_ORDER_SIZE || request.size > MAX_ORDER_SIZE {
        return Err(TradingError::InvalidSize(request.size));
    }
    if request.leverage == 0 {
        return Err(TradingError::InvalidOrder(
            "Leverage must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_price(kind: &str, price: Decimal) -> TradingResult<()> {
    if price <= Decimal::ZERO || price > MAX_QUOTE_PRICE {
        return Err(TradingError::InvalidOrder(format!(
            "{} price out of range: {}",
            kind, price
        )));
    }
    Ok(())
}

/// `equity / margin` in percent; 0 without margin, saturated when the margin
/// is too small to divide by
pub fn margin_level(equity: Decimal, margin: Decimal) -> Decimal {
    if margin.is_zero() {
        return Decimal::ZERO;
    }

    equity
        .checked_div(margin)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|level| level.round_dp(2))
        .unwrap_or(if equity.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        })
}

/// `clamp(trade_value * rate, min, max)`
pub fn commission_for(config: &ExecutionConfig, trade_value: Decimal) -> Decimal {
    (trade_value * config.commission_rate).clamp(config.min_commission, config.max_commission)
}

/// Absolute slippage for an order of `size` at `price`.
///
/// Grows with size up to `max_slippage_multiplier`, triples in a volatile
/// regime and is scaled by `multiplier` (2 for stop-loss fills).
pub fn slippage_for(
    config: &ExecutionConfig,
    size: Decimal,
    price: Decimal,
    regime: RegimeKind,
    multiplier: Decimal,
) -> Decimal {
    let amplification = (Decimal::ONE
        + size
            .checked_div(config.slippage_reference_size)
            .unwrap_or(Decimal::ZERO))
    .min(config.max_slippage_multiplier);
    let regime_factor = if regime == RegimeKind::Volatile {
        Decimal::from(3)
    } else {
        Decimal::ONE
    };

    price * config.base_slippage * amplification * regime_factor * multiplier
}

/// Financing accrued on `position` at `now`; zero inside the first 24 hours
pub fn swap_for(policy: &SwapPolicy, position: &Position, now: DateTime<Utc>) -> Decimal {
    let days = (now - position.opened_at).num_days();
    if days < 1 {
        return Decimal::ZERO;
    }

    let rate = match position.side {
        OrderSide::Buy => policy.long_rate_per_day,
        OrderSide::Sell => policy.short_rate_per_day,
    };
    position.size * position.entry_price * rate * Decimal::from(days)
}

/// Latency between the regime-dependent bounds: calm markets fill fastest
pub fn execution_delay(config: &ExecutionConfig, regime: RegimeKind) -> Duration {
    let span = config
        .execution_delay_max_ms
        .saturating_sub(config.execution_delay_min_ms);
    let percent = match regime {
        RegimeKind::Calm => 0,
        RegimeKind::Ranging => 33,
        RegimeKind::Trending => 66,
        RegimeKind::Volatile => 100,
    };
    Duration::from_millis(config.execution_delay_min_ms + span * percent / 100)
}
