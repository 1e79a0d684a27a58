// Trading strategy module
pub mod mean_reversion;
pub mod presets;
pub mod trend_following;

use crate::models::{Action, Position, Timeframe};
use crate::signals::{SignalThresholds, TimeframeAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use mean_reversion::{MeanReversionConfig, MeanReversionStrategy};
pub use presets::{EmergencyLevel, PresetName, TrendPreset};
pub use trend_following::TrendFollowingStrategy;

/// Below this, a strategy's own entry is reported as HOLD
pub const MIN_ENTRY_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TrendFollowing,
    MeanReversion,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::TrendFollowing => f.write_str("TrendFollowing"),
            StrategyKind::MeanReversion => f.write_str("MeanReversion"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Number(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

/// One strategy's view on entering a trade
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyRecommendation {
    pub strategy: StrategyKind,
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
    pub metadata: BTreeMap<String, MetaValue>,
}

impl StrategyRecommendation {
    pub fn new(strategy: StrategyKind, action: Action, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            strategy,
            action,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn hold(strategy: StrategyKind, reason: impl Into<String>) -> Self {
        Self::new(strategy, Action::Hold, 0.0, reason)
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_hold(&self) -> bool {
        self.action == Action::Hold
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExitKind {
    TakeProfit,
    SignalExhausted,
    StopLoss,
    OpposingSignal,
}

/// Advice about an open position. Never an entry on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExitAdvisory {
    pub strategy: StrategyKind,
    pub symbol: String,
    pub kind: ExitKind,
    pub confidence: f64,
    pub reason: String,
    /// Entry to take after closing, when the exit is a reversal
    pub reverse_into: Option<Action>,
}

/// Everything a strategy may look at for one symbol
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub analyses: BTreeMap<Timeframe, TimeframeAnalysis>,
    pub thresholds: SignalThresholds,
    /// Days since the last emitted trade plan (drives emergency presets)
    pub idle_days: f64,
}

impl MarketSnapshot {
    pub fn new(symbol: impl Into<String>, thresholds: SignalThresholds) -> Self {
        Self {
            symbol: symbol.into(),
            analyses: BTreeMap::new(),
            thresholds,
            idle_days: 0.0,
        }
    }

    pub fn with_analysis(mut self, timeframe: Timeframe, analysis: TimeframeAnalysis) -> Self {
        self.analyses.insert(timeframe, analysis);
        self
    }

    pub fn get(&self, timeframe: Timeframe) -> Option<&TimeframeAnalysis> {
        self.analyses.get(&timeframe)
    }
}

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Get strategy name
    fn name(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    /// Timeframes this strategy reads from the snapshot
    fn required_timeframes(&self) -> &[Timeframe];

    fn should_enter_long(&self, market: &MarketSnapshot) -> StrategyRecommendation;

    fn should_enter_short(&self, market: &MarketSnapshot) -> StrategyRecommendation;

    fn should_exit_position(&self, position: &Position, market: &MarketSnapshot) -> Option<ExitAdvisory>;

    /// Single recommendation for the symbol.
    ///
    /// With a position, only a reversing exit can produce a non-HOLD result.
    fn evaluate(&self, market: &MarketSnapshot, position: Option<&Position>) -> StrategyRecommendation {
        if let Some(position) = position {
            if let Some(exit) = self.should_exit_position(position, market) {
                if let Some(action) = exit.reverse_into {
                    return StrategyRecommendation::new(self.kind(), action, exit.confidence, exit.reason)
                        .with_meta("action_type", "reversal")
                        .with_meta("position_side", position.side.to_string());
                }
            }
        }

        let long = self.should_enter_long(market);
        let short = self.should_enter_short(market);

        let best = if long.confidence > short.confidence { long } else { short };
        if best.action.is_entry() && best.confidence > MIN_ENTRY_CONFIDENCE {
            return best;
        }

        if best.reason.is_empty() {
            StrategyRecommendation::hold(self.kind(), "market conditions do not meet entry requirements")
        } else {
            StrategyRecommendation::hold(self.kind(), best.reason)
        }
    }
}
