// src/domain/mod.rs
pub mod errors;
pub mod models;

// Re-export common types for convenience
pub use errors::{
    AppError, AppResult, MarketDataError, MarketDataResult, TradingError, TradingResult,
};
pub use models::{
    AccountSummary, AlertPriority, AlertSeverity, Candle, CloseReason, ClosedPosition,
    EconomicEvent, EventImpact, LiveTick, MarketRegime, Order, OrderKind, OrderRequest, OrderSide,
    OrderStatus, Position, PositionRisk, PositionStatus, Quote, RegimeKind, RiskAlert,
    RiskMetrics, RiskSnapshot, Sentiment, SentimentLabel, TrendDirection, TrendState,
};
