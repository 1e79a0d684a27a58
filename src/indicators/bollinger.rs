/// Bollinger Bands: SMA(period) ± k × population standard deviation
#[derive(Debug, Clone)]
pub struct BollingerSeries {
    pub lower: Vec<f64>,
    pub mid: Vec<f64>,
    pub upper: Vec<f64>,
}

pub fn bollinger_series(prices: &[f64], period: usize, std_dev: f64) -> BollingerSeries {
    let n = prices.len();
    let mut lower = vec![f64::NAN; n];
    let mut mid = vec![f64::NAN; n];
    let mut upper = vec![f64::NAN; n];

    if period == 0 || n < period {
        return BollingerSeries { lower, mid, upper };
    }

    for i in (period - 1)..n {
        let window = &prices[i + 1 - period..=i];
        let (mean, sd) = mean_and_std(window);
        mid[i] = mean;
        lower[i] = mean - std_dev * sd;
        upper[i] = mean + std_dev * sd;
    }

    BollingerSeries { lower, mid, upper }
}

/// Mean and population standard deviation of a window
pub fn mean_and_std(window: &[f64]) -> (f64, f64) {
    if window.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let len = window.len() as f64;
    let mean = window.iter().sum::<f64>() / len;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands_collapse_on_flat_prices() {
        let bands = bollinger_series(&[10.0; 25], 20, 2.0);
        assert!(bands.mid[18].is_nan());
        assert_eq!(bands.mid[24], 10.0);
        assert_eq!(bands.lower[24], 10.0);
        assert_eq!(bands.upper[24], 10.0);
    }

    #[test]
    fn test_band_width_uses_population_std() {
        // mean 2.5, population std sqrt(1.25)
        let bands = bollinger_series(&[1.0, 2.0, 3.0, 4.0], 4, 2.0);
        let sd = 1.25f64.sqrt();
        assert!((bands.upper[3] - (2.5 + 2.0 * sd)).abs() < 1e-12);
        assert!((bands.lower[3] - (2.5 - 2.0 * sd)).abs() < 1e-12);
    }
}
