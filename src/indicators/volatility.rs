// Supplementary market-condition measures used by the trend filters.
// All return None during warm-up instead of failing.

use super::bollinger::mean_and_std;
use super::moving_average::calculate_sma;

/// Rolling coefficient of variation: std / mean of the last `window` closes
pub fn market_volatility(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let (mean, sd) = mean_and_std(&closes[closes.len() - window..]);
    if mean == 0.0 || !mean.is_finite() {
        return None;
    }
    Some(sd / mean)
}

/// Latest volume over its `window`-period average
pub fn volume_ratio(volumes: &[f64], window: usize) -> Option<f64> {
    let avg = calculate_sma(volumes, window)?;
    let current = *volumes.last()?;
    if avg <= 0.0 {
        return None;
    }
    Some(current / avg)
}

/// Fraction of the last `window` values that are <= the latest one
pub fn percentile_rank(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let recent = &values[values.len() - window..];
    if recent.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let latest = recent[window - 1];
    let at_or_below = recent.iter().filter(|&&v| v <= latest).count();
    Some(at_or_below as f64 / window as f64)
}
