// src/market_data/mod.rs
pub mod calendar;
pub mod session;
pub mod simulator;
pub mod timeframe;

use crate::domain::errors::MarketDataResult;
use crate::domain::models::{LiveTick, MarketRegime};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::broadcast;

pub use calendar::EconomicCalendar;
pub use simulator::{MarketSimulator, SymbolSpec};
pub use timeframe::Timeframe;

/// Source of prices for the execution and risk engines
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Latest mid price of `symbol`
    async fn latest_price(&self, symbol: &str) -> MarketDataResult<Decimal>;

    /// Regime currently in force for every symbol
    fn current_regime(&self) -> MarketRegime;

    /// Daily return volatility of `symbol`
    fn asset_volatility(&self, symbol: &str) -> f64;

    /// Stream of live bars across all symbols
    fn live_ticks(&self) -> broadcast::Receiver<LiveTick>;
}
