// Core modules
pub mod api;
pub mod app;
pub mod config;
pub mod decision;
pub mod error;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod signals;
pub mod strategy;

// Re-export commonly used types
pub use api::MarketDataSource;
pub use app::SignalSink;
pub use decision::{Decision, DecisionEngine};
pub use error::{ConfigError, ExchangeError, IndicatorError, SizingError};
pub use models::*;
pub use risk::TradePlan;
pub use strategy::Strategy;
