use crate::indicators::IndicatorSet;
use crate::models::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Categorical reading of a composite score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SignalStrength {
    StrongBuy,
    WeakBuy,
    Neutral,
    WeakSell,
    StrongSell,
}

impl SignalStrength {
    pub fn is_buy(&self) -> bool {
        matches!(self, SignalStrength::StrongBuy | SignalStrength::WeakBuy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, SignalStrength::StrongSell | SignalStrength::WeakSell)
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, SignalStrength::StrongBuy | SignalStrength::StrongSell)
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalStrength::StrongBuy => "STRONG_BUY",
            SignalStrength::WeakBuy => "WEAK_BUY",
            SignalStrength::Neutral => "NEUTRAL",
            SignalStrength::WeakSell => "WEAK_SELL",
            SignalStrength::StrongSell => "STRONG_SELL",
        };
        f.write_str(s)
    }
}

/// Extreme RSI + band touch, evaluated independently of the composite score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReversalTrigger {
    Long,
    Short,
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Indicator {
    Sma,
    Macd,
    Rsi,
    Bollinger,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentScore {
    pub signal: String,
    pub points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeframeScore {
    pub timeframe: Timeframe,
    /// Signed sum of component points (raw scale, ±5 max with default weights)
    pub composite_score: f64,
    pub signal: SignalStrength,
    pub components: BTreeMap<Indicator, ComponentScore>,
}

/// Score, indicators and reversal trigger for one timeframe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeframeAnalysis {
    pub score: TimeframeScore,
    pub indicators: IndicatorSet,
    pub reversal: ReversalTrigger,
}

impl TimeframeAnalysis {
    pub fn composite(&self) -> f64 {
        self.score.composite_score
    }

    pub fn signal(&self) -> SignalStrength {
        self.score.signal
    }
}

/// Per-symbol composite-score thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SignalThresholds {
    pub strong: f64,
    pub weak: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            strong: 2.0,
            weak: 1.0,
        }
    }
}

impl SignalThresholds {
    pub fn classify(&self, score: f64) -> SignalStrength {
        if score >= self.strong {
            SignalStrength::StrongBuy
        } else if score >= self.weak {
            SignalStrength::WeakBuy
        } else if score <= -self.strong {
            SignalStrength::StrongSell
        } else if score <= -self.weak {
            SignalStrength::WeakSell
        } else {
            SignalStrength::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// RSI above this adds bullish momentum points
    pub rsi_upper: f64,
    /// RSI below this adds bearish momentum points
    pub rsi_lower: f64,
    pub rsi_weight: f64,
    pub bb_weight: f64,
    pub reversal_rsi_oversold: f64,
    pub reversal_rsi_overbought: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rsi_upper: 65.0,
            rsi_lower: 35.0,
            rsi_weight: 0.5,
            bb_weight: 0.5,
            reversal_rsi_oversold: 20.0,
            reversal_rsi_overbought: 80.0,
        }
    }
}

/// Reduces an [`IndicatorSet`] to a signed composite score.
#[derive(Debug, Clone, Default)]
pub struct TimeframeScorer {
    config: ScoringConfig,
}

impl TimeframeScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Largest possible |composite_score|
    pub fn max_score(&self) -> f64 {
        2.0 + 2.0 + self.config.rsi_weight + self.config.bb_weight
    }

    pub fn score(
        &self,
        timeframe: Timeframe,
        ind: &IndicatorSet,
        thresholds: &SignalThresholds,
    ) -> TimeframeScore {
        let mut components = BTreeMap::new();

        let (label, points) = if ind.close > ind.sma_short && ind.sma_short > ind.sma_long {
            ("bullish_alignment", 2.0)
        } else if ind.close < ind.sma_short && ind.sma_short < ind.sma_long {
            ("bearish_alignment", -2.0)
        } else if ind.close > ind.sma_short {
            ("above_short_ma", 1.0)
        } else if ind.close < ind.sma_short {
            ("below_short_ma", -1.0)
        } else {
            ("flat", 0.0)
        };
        components.insert(Indicator::Sma, component(label, points));

        let (label, points) = if ind.macd > ind.macd_signal && ind.macd_hist > 0.0 {
            ("bullish_momentum", 2.0)
        } else if ind.macd < ind.macd_signal && ind.macd_hist < 0.0 {
            ("bearish_momentum", -2.0)
        } else if ind.macd > ind.macd_signal {
            ("bullish_cross", 1.0)
        } else if ind.macd < ind.macd_signal {
            ("bearish_cross", -1.0)
        } else {
            ("flat", 0.0)
        };
        components.insert(Indicator::Macd, component(label, points));

        let (label, points) = if ind.rsi > self.config.rsi_upper {
            ("strong", self.config.rsi_weight)
        } else if ind.rsi < self.config.rsi_lower {
            ("weak", -self.config.rsi_weight)
        } else {
            ("neutral", 0.0)
        };
        components.insert(Indicator::Rsi, component(label, points));

        let (label, points) = if ind.close > ind.bb_upper {
            ("above_upper", self.config.bb_weight)
        } else if ind.close < ind.bb_lower {
            ("below_lower", -self.config.bb_weight)
        } else {
            ("inside", 0.0)
        };
        components.insert(Indicator::Bollinger, component(label, points));

        let composite_score: f64 = components.values().map(|c| c.points).sum();

        TimeframeScore {
            timeframe,
            composite_score,
            signal: thresholds.classify(composite_score),
            components,
        }
    }

    pub fn reversal_trigger(&self, ind: &IndicatorSet) -> ReversalTrigger {
        if ind.rsi <= self.config.reversal_rsi_oversold && ind.close <= ind.bb_lower {
            ReversalTrigger::Long
        } else if ind.rsi >= self.config.reversal_rsi_overbought && ind.close >= ind.bb_upper {
            ReversalTrigger::Short
        } else {
            ReversalTrigger::None
        }
    }

    pub fn analyze(
        &self,
        timeframe: Timeframe,
        indicators: IndicatorSet,
        thresholds: &SignalThresholds,
    ) -> TimeframeAnalysis {
        let score = self.score(timeframe, &indicators, thresholds);
        let reversal = self.reversal_trigger(&indicators);
        tracing::debug!(
            "📐 {} score {:+.1} ({}) rsi={:.1} reversal={:?}",
            timeframe,
            score.composite_score,
            score.signal,
            indicators.rsi,
            reversal
        );
        TimeframeAnalysis {
            score,
            indicators,
            reversal,
        }
    }
}

fn component(signal: &str, points: f64) -> ComponentScore {
    ComponentScore {
        signal: signal.to_string(),
        points,
    }
}

/// Cross-timeframe conviction, clipped to 0..=10.
///
/// Volume above 1.2× its average adds 0.3; ATR in its top 20% subtracts 0.5.
pub fn signal_strength(daily: f64, h4: f64, h1: f64, ind: &IndicatorSet) -> f64 {
    let mut strength = daily.abs() * 0.5 + h4.abs() * 0.3 + h1.abs() * 0.2;

    if ind.volume_ratio.is_some_and(|r| r > 1.2) {
        strength += 0.3;
    }
    if ind.atr_rank.is_some_and(|r| r > 0.8) {
        strength -= 0.5;
    }

    strength.clamp(0.0, 10.0)
}

/// Market counts as trending when rolling volatility exceeds `threshold`
pub fn is_trending(ind: &IndicatorSet, threshold: f64) -> bool {
    ind.market_volatility.is_some_and(|v| v > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn indicators(close: f64, rsi: f64) -> IndicatorSet {
        IndicatorSet {
            as_of: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            close,
            sma_short: 100.0,
            sma_long: 100.0,
            macd: 0.0,
            macd_signal: 0.0,
            macd_hist: 0.0,
            rsi,
            bb_lower: 90.0,
            bb_mid: 100.0,
            bb_upper: 110.0,
            atr: 2.0,
            volume_ratio: None,
            atr_rank: None,
            market_volatility: None,
        }
    }

    #[test]
    fn test_fully_bullish_score_hits_max() {
        let scorer = TimeframeScorer::default();
        let mut ind = indicators(115.0, 72.0);
        ind.sma_short = 105.0;
        ind.macd = 1.5;
        ind.macd_signal = 1.0;
        ind.macd_hist = 0.5;

        let score = scorer.score(Timeframe::H1, &ind, &SignalThresholds::default());
        assert_eq!(score.composite_score, scorer.max_score());
        assert_eq!(score.composite_score, 5.0);
        assert_eq!(score.signal, SignalStrength::StrongBuy);
        assert_eq!(score.components[&Indicator::Sma].points, 2.0);
    }

    #[test]
    fn test_mixed_score_sums_signed_points() {
        let scorer = TimeframeScorer::default();
        // close above short MA but MAs inverted (+1), bearish MACD (-2), weak RSI (-0.5)
        let mut ind = indicators(101.0, 30.0);
        ind.sma_short = 100.0;
        ind.sma_long = 105.0;
        ind.macd = -1.0;
        ind.macd_signal = -0.5;
        ind.macd_hist = -0.5;

        let score = scorer.score(Timeframe::H4, &ind, &SignalThresholds::default());
        assert_eq!(score.composite_score, -1.5);
        assert_eq!(score.signal, SignalStrength::WeakSell);
    }

    #[test]
    fn test_equal_values_score_zero() {
        let scorer = TimeframeScorer::default();
        let score = scorer.score(Timeframe::D1, &indicators(100.0, 50.0), &SignalThresholds::default());
        assert_eq!(score.composite_score, 0.0);
        assert_eq!(score.signal, SignalStrength::Neutral);
    }

    #[test]
    fn test_classify_uses_symbol_thresholds() {
        let strict = SignalThresholds { strong: 4.0, weak: 2.0 };
        assert_eq!(strict.classify(3.0), SignalStrength::WeakBuy);
        assert_eq!(strict.classify(-4.0), SignalStrength::StrongSell);
        assert_eq!(strict.classify(1.5), SignalStrength::Neutral);
    }

    #[test]
    fn test_reversal_trigger_needs_rsi_and_band() {
        let scorer = TimeframeScorer::default();
        assert_eq!(scorer.reversal_trigger(&indicators(89.0, 18.0)), ReversalTrigger::Long);
        assert_eq!(scorer.reversal_trigger(&indicators(95.0, 18.0)), ReversalTrigger::None);
        assert_eq!(scorer.reversal_trigger(&indicators(110.0, 80.0)), ReversalTrigger::Short);
        assert_eq!(scorer.reversal_trigger(&indicators(111.0, 79.0)), ReversalTrigger::None);
    }

    #[test]
    fn test_signal_strength_filters() {
        let mut ind = indicators(100.0, 50.0);
        assert!((signal_strength(4.0, 2.0, 3.0, &ind) - 3.2).abs() < 1e-9);

        ind.volume_ratio = Some(1.5);
        ind.atr_rank = Some(0.9);
        assert!((signal_strength(4.0, 2.0, 3.0, &ind) - 3.0).abs() < 1e-9);
        assert_eq!(signal_strength(0.0, 0.0, 0.0, &ind), 0.0);
    }

    #[test]
    fn test_is_trending() {
        let mut ind = indicators(100.0, 50.0);
        assert!(!is_trending(&ind, 0.02));
        ind.market_volatility = Some(0.03);
        assert!(is_trending(&ind, 0.02));
    }
}
