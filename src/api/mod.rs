// Exchange access
pub mod binance;

use crate::error::ExchangeError;
use crate::models::{AccountBalance, Candle, Position, Timeframe};
use async_trait::async_trait;

pub use binance::{from_exchange_symbol, to_exchange_symbol, BinanceFuturesClient};

/// Read-only market and account data used by both loops
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Most recent `limit` candles, oldest first. The last one may still be forming.
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, ExchangeError>;

    async fn get_open_positions(&self) -> Result<Vec<Position>, ExchangeError>;

    async fn get_account_balance(&self) -> Result<AccountBalance, ExchangeError>;
}
