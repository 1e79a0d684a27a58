/// Average True Range (ATR) indicator
///
/// Measures market volatility by calculating the average of true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Uses Wilder's smoothing (same as RSI) for the moving average.

use crate::models::Candle;

/// True range per candle; index 0 has no previous close and is NaN
fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        out[i] = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
    }
    out
}

/// ATR aligned with `candles`
///
/// NaN until index `period`; the first value is the simple average of the
/// first `period` true ranges, later values are Wilder-smoothed.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    let tr = true_ranges(candles);

    // First ATR is simple average of first 'period' true ranges
    let mut atr: f64 = tr[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = atr;

    // Apply Wilder's smoothing for subsequent values
    for i in (period + 1)..candles.len() {
        atr = (atr * (period as f64 - 1.0) + tr[i]) / period as f64;
        out[i] = atr;
    }

    out
}

/// Calculate ATR for the given candles
///
/// Returns the current ATR value, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    atr_series(candles, period)
        .last()
        .copied()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn create_test_candles(prices: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                open_time: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_calculate_atr() {
        // Low volatility market
        let candles = create_test_candles(&[(100.0, 101.0, 99.0, 100.0); 15]);
        let atr = calculate_atr(&candles, 14);

        assert!(atr.is_some());
        // ATR should equal the constant high-low range
        assert!((atr.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_atr_high_volatility() {
        // High volatility market with gaps
        let high_vol_prices = vec![
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 110.0, 98.0, 105.0),
            (105.0, 108.0, 92.0, 95.0),
            (95.0, 103.0, 88.0, 100.0),
            (100.0, 115.0, 97.0, 110.0),
            (110.0, 112.0, 95.0, 98.0),
            (98.0, 108.0, 90.0, 105.0),
            (105.0, 120.0, 100.0, 115.0),
            (115.0, 118.0, 105.0, 110.0),
            (110.0, 125.0, 108.0, 120.0),
            (120.0, 130.0, 115.0, 125.0),
            (125.0, 128.0, 110.0, 115.0),
            (115.0, 122.0, 105.0, 118.0),
            (118.0, 130.0, 115.0, 125.0),
            (125.0, 135.0, 120.0, 130.0),
        ];

        let candles = create_test_candles(&high_vol_prices);
        let atr = calculate_atr(&candles, 14);

        assert!(atr.is_some());
        // ATR should be higher for volatile market
        assert!(atr.unwrap() > 10.0);
    }

    #[test]
    fn test_true_range_uses_gap_from_previous_close() {
        let candles = create_test_candles(&[(100.0, 101.0, 99.0, 100.0), (110.0, 111.0, 109.0, 110.0)]);
        let tr = true_ranges(&candles);
        assert!(tr[0].is_nan());
        assert_eq!(tr[1], 11.0);
    }

    #[test]
    fn test_insufficient_data() {
        let candles = create_test_candles(&[(100.0, 101.0, 99.0, 100.0); 2]);
        let atr = calculate_atr(&candles, 14);

        assert!(atr.is_none());
    }

    #[test]
    fn test_atr_series_alignment() {
        let candles = create_test_candles(&[(100.0, 105.0, 95.0, 100.0); 17]);
        let series = atr_series(&candles, 14);

        assert_eq!(series.len(), 17);
        assert!(series[13].is_nan());
        assert_eq!(series[14], 10.0);
        assert_eq!(series[16], 10.0);
    }
}
