use crate::indicators::IndicatorParams;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strong-threshold relaxation after a stretch without any trade plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EmergencyLevel {
    pub idle_days: f64,
    pub strong_threshold: f64,
}

/// Parameter set for the trend-following strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPreset {
    pub name: PresetName,
    pub indicators: IndicatorParams,
    /// Extra signal-strength floor on the strong path (0 disables)
    pub strong_min_strength: f64,
    /// Enables the looser weak-signal entry path
    pub weak_entries: bool,
    pub weak_min_strength: f64,
    /// Weak entries also require a trending market
    pub require_trending: bool,
    pub trending_threshold: f64,
    /// Confidence of a reversal raised by an opposing 1h signal
    pub exit_confidence: f64,
    /// Sorted by idle_days ascending
    pub emergency_levels: Vec<EmergencyLevel>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresetName {
    Classic,
    Optimized,
    V2,
    #[default]
    V2_1,
    V2_2,
    V2_3,
    V2_4,
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PresetName::Classic => "classic",
            PresetName::Optimized => "optimized",
            PresetName::V2 => "v2",
            PresetName::V2_1 => "v2_1",
            PresetName::V2_2 => "v2_2",
            PresetName::V2_3 => "v2_3",
            PresetName::V2_4 => "v2_4",
        };
        f.write_str(s)
    }
}

impl PresetName {
    pub fn all() -> [PresetName; 7] {
        [
            PresetName::Classic,
            PresetName::Optimized,
            PresetName::V2,
            PresetName::V2_1,
            PresetName::V2_2,
            PresetName::V2_3,
            PresetName::V2_4,
        ]
    }

    pub fn preset(&self) -> TrendPreset {
        let base = TrendPreset {
            name: *self,
            indicators: IndicatorParams::default(),
            strong_min_strength: 0.0,
            weak_entries: true,
            weak_min_strength: 3.0,
            require_trending: false,
            trending_threshold: 0.02,
            exit_confidence: 0.8,
            emergency_levels: Vec::new(),
        };

        match self {
            PresetName::Classic => TrendPreset {
                indicators: IndicatorParams::classic(),
                weak_entries: false,
                weak_min_strength: 0.0,
                ..base
            },
            PresetName::Optimized => TrendPreset {
                indicators: IndicatorParams {
                    sma_long: 45,
                    macd_slow: 24,
                    ..IndicatorParams::default()
                },
                weak_min_strength: 5.0,
                require_trending: true,
                ..base
            },
            PresetName::V2 => TrendPreset {
                indicators: IndicatorParams {
                    sma_short: 19,
                    sma_long: 47,
                    macd_fast: 12,
                    ..IndicatorParams::default()
                },
                strong_min_strength: 6.0,
                weak_min_strength: 4.0,
                trending_threshold: 0.025,
                ..base
            },
            PresetName::V2_1 => base,
            PresetName::V2_2 => TrendPreset {
                weak_min_strength: 2.5,
                trending_threshold: 0.018,
                ..base
            },
            PresetName::V2_3 => TrendPreset {
                weak_min_strength: 2.5,
                trending_threshold: 0.016,
                emergency_levels: vec![EmergencyLevel {
                    idle_days: 5.0,
                    strong_threshold: 0.0,
                }],
                ..base
            },
            PresetName::V2_4 => TrendPreset {
                emergency_levels: vec![
                    EmergencyLevel { idle_days: 3.0, strong_threshold: 2.0 },
                    EmergencyLevel { idle_days: 5.0, strong_threshold: 1.0 },
                    EmergencyLevel { idle_days: 7.0, strong_threshold: 0.0 },
                ],
                ..base
            },
        }
    }
}

impl TrendPreset {
    /// Deepest emergency level reached after `idle_days` without a plan
    pub fn emergency_level(&self, idle_days: f64) -> Option<(usize, EmergencyLevel)> {
        self.emergency_levels
            .iter()
            .enumerate()
            .filter(|(_, level)| idle_days >= level.idle_days)
            .last()
            .map(|(i, level)| (i + 1, *level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorEngine;

    #[test]
    fn test_every_preset_warms_up_within_sixty_candles() {
        for name in PresetName::all() {
            let preset = name.preset();
            let engine = IndicatorEngine::new(preset.indicators);
            assert!(engine.min_candles() <= 60, "{} needs {}", name, engine.min_candles());
            assert_eq!(preset.name, name);
        }
    }

    #[test]
    fn test_v2_4_emergency_levels_escalate() {
        let preset = PresetName::V2_4.preset();
        assert!(preset.emergency_level(2.9).is_none());
        assert_eq!(preset.emergency_level(3.0).unwrap().0, 1);
        assert_eq!(preset.emergency_level(6.0).unwrap().1.strong_threshold, 1.0);
        assert_eq!(preset.emergency_level(10.0).unwrap().0, 3);
    }

    #[test]
    fn test_default_preset_uses_default_indicators() {
        let preset = PresetName::default().preset();
        assert_eq!(preset.name, PresetName::V2_1);
        assert_eq!(preset.indicators, IndicatorParams::default());
        assert!(PresetName::V2_1.preset().emergency_level(30.0).is_none());
    }
}
