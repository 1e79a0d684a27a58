use crate::error::IndicatorError;
use crate::models::Candle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::atr::{atr_series, calculate_atr};
use super::bollinger::bollinger_series;
use super::macd::{macd_series, macd_warmup};
use super::moving_average::sma_series;
use super::rsi::rsi_series;
use super::volatility::{market_volatility, percentile_rank, volume_ratio};

/// Hard floor on candles per timeframe, regardless of indicator windows
pub const MIN_CANDLES: usize = 50;

/// Indicator windows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndicatorParams {
    pub sma_short: usize,
    pub sma_long: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub atr_period: usize,
    pub volume_window: usize,
    pub volatility_window: usize,
    pub atr_rank_window: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_short: 18,         // tuned down from 20
            sma_long: 46,          // tuned down from 50
            macd_fast: 11,
            macd_slow: 25,
            macd_signal: 9,
            rsi_period: 14,
            bb_period: 20,
            bb_std_dev: 2.0,
            atr_period: 14,
            volume_window: 20,
            volatility_window: 50,
            atr_rank_window: 50,
        }
    }
}

impl IndicatorParams {
    /// Textbook 20/50 SMA and 12/26/9 MACD
    pub fn classic() -> Self {
        Self {
            sma_short: 20,
            sma_long: 50,
            macd_fast: 12,
            macd_slow: 26,
            ..Self::default()
        }
    }

    /// Closed rows needed before every required indicator is defined
    pub fn warmup_rows(&self) -> usize {
        [
            self.sma_short,
            self.sma_long,
            macd_warmup(self.macd_fast.max(self.macd_slow), self.macd_signal),
            self.rsi_period + 1,
            self.bb_period,
            self.atr_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Indicator values on the last closed candle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSet {
    pub as_of: DateTime<Utc>,
    pub close: f64,
    pub sma_short: f64,
    pub sma_long: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub rsi: f64,
    pub bb_lower: f64,
    pub bb_mid: f64,
    pub bb_upper: f64,
    pub atr: f64,
    /// Latest volume relative to its rolling average
    pub volume_ratio: Option<f64>,
    /// Percentile of the latest ATR within its recent history (0..=1)
    pub atr_rank: Option<f64>,
    /// Rolling std/mean of closes
    pub market_volatility: Option<f64>,
}

/// Computes an [`IndicatorSet`] from a candle series.
///
/// The newest candle is assumed to still be forming and is never used.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Candles (including the forming one) required by [`Self::compute`]
    pub fn min_candles(&self) -> usize {
        MIN_CANDLES.max(self.params.warmup_rows() + 1)
    }

    pub fn compute(&self, candles: &[Candle]) -> Result<IndicatorSet, IndicatorError> {
        let needed = self.min_candles();
        let insufficient = IndicatorError::InsufficientData {
            needed,
            got: candles.len(),
        };
        if candles.len() < needed {
            return Err(insufficient);
        }

        let closed = &candles[..candles.len() - 1];
        if closed.iter().any(|c| !c.is_finite()) {
            return Err(insufficient);
        }

        let p = &self.params;
        let closes: Vec<f64> = closed.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = closed.iter().map(|c| c.volume).collect();
        let last = closed.len() - 1;

        let sma_short = sma_series(&closes, p.sma_short)[last];
        let sma_long = sma_series(&closes, p.sma_long)[last];
        let macd = macd_series(&closes, p.macd_fast, p.macd_slow, p.macd_signal);
        let rsi = rsi_series(&closes, p.rsi_period)[last];
        let bands = bollinger_series(&closes, p.bb_period, p.bb_std_dev);
        let atr = atr_series(closed, p.atr_period);

        let set = IndicatorSet {
            as_of: closed[last].open_time,
            close: closes[last],
            sma_short,
            sma_long,
            macd: macd.macd[last],
            macd_signal: macd.signal[last],
            macd_hist: macd.hist[last],
            rsi,
            bb_lower: bands.lower[last],
            bb_mid: bands.mid[last],
            bb_upper: bands.upper[last],
            atr: atr[last],
            volume_ratio: volume_ratio(&volumes, p.volume_window),
            atr_rank: percentile_rank(&atr, p.atr_rank_window),
            market_volatility: market_volatility(&closes, p.volatility_window),
        };

        let required = [
            set.sma_short,
            set.sma_long,
            set.macd,
            set.macd_signal,
            set.macd_hist,
            set.rsi,
            set.bb_lower,
            set.bb_mid,
            set.bb_upper,
            set.atr,
        ];
        if required.iter().any(|v| !v.is_finite()) {
            return Err(insufficient);
        }

        Ok(set)
    }

    /// ATR used for stop sizing, on closed candles only
    pub fn sizing_atr(candles: &[Candle], length: usize) -> Result<f64, IndicatorError> {
        let needed = length + 2;
        let insufficient = IndicatorError::InsufficientData {
            needed,
            got: candles.len(),
        };
        if candles.len() < needed {
            return Err(insufficient);
        }

        let closed = &candles[..candles.len() - 1];
        calculate_atr(closed, length).ok_or(insufficient)
    }
}
