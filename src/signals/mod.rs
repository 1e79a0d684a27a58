// Per-timeframe signal scoring
pub mod scorer;

pub use scorer::{
    is_trending, signal_strength, ComponentScore, Indicator, ReversalTrigger, ScoringConfig,
    SignalStrength, SignalThresholds, TimeframeAnalysis, TimeframeScore, TimeframeScorer,
};
