use super::moving_average::ema_series;

/// MACD line, signal line and histogram, aligned with the input prices
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

/// MACD = EMA(fast) - EMA(slow); signal = EMA(signal) of the MACD line
pub fn macd_series(prices: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema_series(prices, fast);
    let slow_ema = ema_series(prices, slow);

    let macd: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&macd, signal);
    let hist = macd
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| m - s)
        .collect();

    MacdSeries {
        macd,
        signal: signal_line,
        hist,
    }
}

/// Rows needed before the signal line is defined
pub fn macd_warmup(slow: usize, signal: usize) -> usize {
    slow + signal.saturating_sub(1)
}
