// Technical indicators module
// SMA, EMA, MACD, RSI, Bollinger Bands, ATR plus volume/volatility filters

pub mod atr;
pub mod bollinger;
pub mod engine;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod volatility;

pub use atr::{atr_series, calculate_atr};
pub use bollinger::{bollinger_series, BollingerSeries};
pub use engine::{IndicatorEngine, IndicatorParams, IndicatorSet, MIN_CANDLES};
pub use macd::{macd_series, MacdSeries};
pub use moving_average::{calculate_ema, calculate_sma, ema_series, sma_series};
pub use rsi::{calculate_rsi, rsi_series};
pub use volatility::{market_volatility, percentile_rank, volume_ratio};
