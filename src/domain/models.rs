// src/domain/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Market Data Structures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn body(&self) -> Decimal {
        (self.close - self.open).abs()
    }
}

/// A candle published by the live tick task
#[derive(Debug, Clone, Serialize)]
pub struct LiveTick {
    pub symbol: String,
    pub candle: Candle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub spread: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

impl TrendDirection {
    pub fn sign(&self) -> f64 {
        match self {
            TrendDirection::Up => 1.0,
            TrendDirection::Down => -1.0,
            TrendDirection::Sideways => 0.0,
        }
    }
}

/// Per-symbol trend descriptor read by the movement generator.
///
/// `support_level < resistance_level` when the trend is rolled; shocks may
/// push the price through either level without the levels being corrected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendState {
    pub direction: TrendDirection,
    pub strength: f64,
    pub momentum: f64,
    pub support_level: f64,
    pub resistance_level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegimeKind {
    Trending,
    Ranging,
    Volatile,
    Calm,
}

impl RegimeKind {
    pub const ALL: [RegimeKind; 4] = [
        RegimeKind::Trending,
        RegimeKind::Ranging,
        RegimeKind::Volatile,
        RegimeKind::Calm,
    ];

    pub fn volatility_multiplier(&self) -> f64 {
        match self {
            RegimeKind::Volatile => 2.5,
            RegimeKind::Trending => 1.5,
            RegimeKind::Ranging => 0.8,
            RegimeKind::Calm => 0.6,
        }
    }
}

impl fmt::Display for RegimeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegimeKind::Trending => write!(f, "TRENDING"),
            RegimeKind::Ranging => write!(f, "RANGING"),
            RegimeKind::Volatile => write!(f, "VOLATILE"),
            RegimeKind::Calm => write!(f, "CALM"),
        }
    }
}

/// Process-wide market character, replaced wholesale on every re-roll
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketRegime {
    pub kind: RegimeKind,
    pub strength: f64,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
}

impl MarketRegime {
    pub fn new(kind: RegimeKind, strength: f64, duration_minutes: u32) -> Self {
        Self {
            kind,
            strength: strength.clamp(0.0, 1.0),
            duration_minutes,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventImpact {
    Low,
    Medium,
    High,
}

impl EventImpact {
    pub fn weight(&self) -> f64 {
        match self {
            EventImpact::Low => 0.5,
            EventImpact::Medium => 1.5,
            EventImpact::High => 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub scheduled_at: DateTime<Utc>,
    pub impact: EventImpact,
    pub currency_code: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SentimentLabel {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub strength: f64,
}

/// Core Trading Components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// +1 for long exposure, -1 for short
    pub fn sign(&self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// What a caller asks the engine to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub size: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: u32,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, size: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::Market,
            size,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
            leverage: 1,
        }
    }

    pub fn limit(symbol: &str, side: OrderSide, size: Decimal, limit_price: Decimal) -> Self {
        Self {
            kind: OrderKind::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, size)
        }
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = Some(price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub size: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub filled_price: Option<Decimal>,
    pub position_id: Option<String>,
}

impl Order {
    /// Request that re-executes this order at its limit price
    pub fn fill_request(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: self.side,
            kind: OrderKind::Market,
            size: self.size,
            limit_price: None,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            leverage: self.leverage,
        }
    }

    /// Buy fills at or below the limit, sell at or above
    pub fn is_marketable(&self, price: Decimal) -> bool {
        match (self.side, self.limit_price) {
            (OrderSide::Buy, Some(limit)) => price <= limit,
            (OrderSide::Sell, Some(limit)) => price >= limit,
            (_, None) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closing => write!(f, "CLOSING"),
            PositionStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    Manual,
    StopLoss,
    TakeProfit,
}

/// Position information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: u32,
    pub margin: Decimal,
    pub unrealized_pnl: Decimal,
    pub pnl_percent: Decimal,
    pub swap: Decimal,
    pub commission: Decimal,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
}

impl Position {
    /// Price P&L at `price`: `(price - entry) * size * leverage`, sign flipped for shorts
    pub fn price_pnl(&self, price: Decimal) -> Decimal {
        price
            .saturating_sub(self.entry_price)
            .saturating_mul(self.size)
            .saturating_mul(Decimal::from(self.leverage))
            .saturating_mul(self.side.sign())
    }

    /// Recalculate unrealized PnL based on current price
    pub fn calculate_pnl(&mut self, current_price: Decimal) {
        self.current_price = current_price;
        self.unrealized_pnl = self.price_pnl(current_price);
        self.pnl_percent = self
            .unrealized_pnl
            .checked_div(self.margin)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .map_or(Decimal::ZERO, |percent| percent.round_dp(4));
    }

    /// Stop-loss wins when a single price satisfies both bounds
    pub fn breach(&self, price: Decimal) -> Option<CloseReason> {
        let (stop_hit, target_hit) = match self.side {
            OrderSide::Buy => (
                self.stop_loss.is_some_and(|sl| price <= sl),
                self.take_profit.is_some_and(|tp| price >= tp),
            ),
            OrderSide::Sell => (
                self.stop_loss.is_some_and(|sl| price >= sl),
                self.take_profit.is_some_and(|tp| price <= tp),
            ),
        };

        if stop_hit {
            Some(CloseReason::StopLoss)
        } else if target_hit {
            Some(CloseReason::TakeProfit)
        } else {
            None
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Trade record produced when a position leaves the book
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub close_price: Decimal,
    pub price_pnl: Decimal,
    pub swap: Decimal,
    pub commission: Decimal,
    pub total_pnl: Decimal,
    pub reason: CloseReason,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin: Decimal,
    pub free_margin: Decimal,
    /// Zero when no margin is in use
    pub margin_level: Decimal,
}

/// Risk Structures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRisk {
    pub position_id: String,
    pub symbol: String,
    pub risk_amount: Decimal,
    pub risk_percent: f64,
    pub risk_reward_ratio: f64,
    pub leverage: u32,
    pub margin: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub balance: Decimal,
    pub equity: Decimal,
    pub used_margin: Decimal,
    pub free_margin: Decimal,
    pub margin_level: f64,
    pub current_drawdown: f64,
    pub max_drawdown: f64,
    pub risk_score: f64,
    pub exposure_percent: f64,
    pub daily_var: Decimal,
    pub sharpe_ratio: f64,
    pub max_allowed_leverage: u32,
    pub recommended_position_size: Decimal,
    pub open_positions: usize,
    pub computed_at: DateTime<Utc>,
}

/// What risk subscribers receive after every computation
#[derive(Debug, Clone, Serialize)]
pub struct RiskSnapshot {
    pub metrics: RiskMetrics,
    pub positions: Vec<PositionRisk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAlert {
    pub id: u64,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub priority: AlertPriority,
    pub action_required: bool,
}

/// Convert a simulated `f64` price into a quoted decimal with `dp` places
pub fn to_decimal(value: f64, dp: u32) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(dp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long(stop_loss: Option<Decimal>, take_profit: Option<Decimal>) -> Position {
        Position {
            id: "POS-000001".to_string(),
            symbol: "EUR/USD".to_string(),
            side: OrderSide::Buy,
            size: dec!(1000),
            entry_price: dec!(1.0950),
            current_price: dec!(1.0950),
            stop_loss,
            take_profit,
            leverage: 100,
            margin: dec!(10.95),
            unrealized_pnl: Decimal::ZERO,
            pnl_percent: Decimal::ZERO,
            swap: Decimal::ZERO,
            commission: dec!(2.50),
            opened_at: Utc::now(),
            status: PositionStatus::Open,
        }
    }

    #[test]
    fn short_pnl_is_mirrored() {
        let mut position = long(None, None);
        position.side = OrderSide::Sell;
        position.calculate_pnl(dec!(1.0940));
        assert_eq!(position.unrealized_pnl, dec!(100.0000));
    }

    #[test]
    fn stop_loss_takes_precedence_over_take_profit() {
        // Inverted bounds so one price satisfies both
        let position = long(Some(dec!(1.1000)), Some(dec!(1.0900)));
        assert_eq!(position.breach(dec!(1.0950)), Some(CloseReason::StopLoss));
    }

    #[test]
    fn limit_marketability_depends_on_side() {
        let order = Order {
            id: "ORD-000001".to_string(),
            symbol: "EUR/USD".to_string(),
            side: OrderSide::Sell,
            kind: OrderKind::Limit,
            size: dec!(1000),
            limit_price: Some(dec!(1.1000)),
            stop_loss: None,
            take_profit: None,
            leverage: 10,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            filled_at: None,
            filled_price: None,
            position_id: None,
        };
        assert!(!order.is_marketable(dec!(1.0999)));
        assert!(order.is_marketable(dec!(1.1000)));
    }
}
