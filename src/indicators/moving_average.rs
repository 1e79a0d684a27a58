/// Calculate Simple Moving Average (SMA) of the most recent `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// SMA aligned with `values`; NaN until the window is full
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }

    out
}

/// EMA aligned with `values`, seeded with the SMA of its first full window.
///
/// Leading NaN in the input (an upstream warm-up) are skipped before seeding.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }

    let start = match values.iter().position(|v| v.is_finite()) {
        Some(i) => i,
        None => return out,
    };
    if values.len() - start < period {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed_end = start + period;
    let mut ema = values[start..seed_end].iter().sum::<f64>() / period as f64;
    out[seed_end - 1] = ema;

    for i in seed_end..values.len() {
        ema = (values[i] - ema) * multiplier + ema;
        out[i] = ema;
    }

    out
}

/// Calculate Exponential Moving Average (EMA), latest value only
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period)
        .last()
        .copied()
        .filter(|v| v.is_finite())
}
