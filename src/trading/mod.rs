// src/trading/mod.rs
pub mod execution;
pub mod risk;

pub use execution::{EngineEvent, ExecutionEngine, LimitCheck, MarkOutcome};
pub use risk::{RiskAggregator, RiskFactors, Subscription};
