// src/lib.rs
// Main library module declarations

pub mod config;
pub mod domain;
pub mod market_data;
pub mod trading;

pub use config::Config;
pub use domain::errors::{AppError, AppResult};
pub use market_data::{MarketSimulator, PriceFeed};
pub use trading::{ExecutionEngine, RiskAggregator};
