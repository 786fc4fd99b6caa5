// src/domain/errors.rs
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::models::{OrderStatus, PositionStatus};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Trading error: {0}")]
    Trading(#[from] TradingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("Invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: f64 },
}

/// Every variant is terminal for the call that raised it; nothing is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradingError {
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Order size out of range: {0}")]
    InvalidSize(Decimal),

    #[error("Limit order requires a limit price")]
    MissingLimitPrice,

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Decimal, available: Decimal },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order {id} is not pending (status {status})")]
    OrderNotPending { id: String, status: OrderStatus },

    #[error("Order {0} is being filled")]
    OrderFilling(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Position {id} is not open (status {status})")]
    PositionNotOpen { id: String, status: PositionStatus },

    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type MarketDataResult<T> = Result<T, MarketDataError>;
pub type TradingResult<T> = Result<T, TradingError>;
