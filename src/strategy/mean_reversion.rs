use crate::models::{Action, Position, Timeframe};
use crate::signals::ReversalTrigger;
use crate::strategy::{
    ExitAdvisory, ExitKind, MarketSnapshot, Strategy, StrategyKind, StrategyRecommendation,
};
use serde::{Deserialize, Serialize};

const TIMEFRAMES: [Timeframe; 1] = [Timeframe::H1];

/// Standard RSI bounds the confidence bonus is measured from
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

/// Mean reversion (reversal) strategy
///
/// Trades extreme 1h exhaustion: RSI at an extreme while price sits on or
/// beyond a Bollinger band. The entry trigger itself comes from the scorer's
/// [`ReversalTrigger`]; this strategy adds confidence and exit management.
///
/// Exit conditions (first match wins):
/// - Profit target reached (e.g. +3%)
/// - RSI back in the neutral zone with a small profit
/// - Loss limit hit (e.g. -2%)
#[derive(Debug, Clone, Default)]
pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeanReversionConfig {
    /// Entries below this confidence are rejected
    pub min_confidence: f64,

    /// Profit (%) that triggers a take-profit advisory
    pub take_profit_pct: f64,

    /// Loss (%) that triggers a stop-loss advisory
    pub stop_loss_pct: f64,

    /// Neutral RSI zone where the reversal is considered spent
    pub exhaustion_rsi_low: f64,
    pub exhaustion_rsi_high: f64,

    /// Profit (%) required before an exhaustion exit
    pub exhaustion_min_profit_pct: f64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            take_profit_pct: 3.0,
            stop_loss_pct: 2.0,
            exhaustion_rsi_low: 40.0,
            exhaustion_rsi_high: 60.0,
            exhaustion_min_profit_pct: 1.0,
        }
    }
}

impl MeanReversionStrategy {
    pub fn new(config: MeanReversionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MeanReversionConfig {
        &self.config
    }

    /// 0.6 base + RSI extremity (up to 0.2) + closeness to the band (up to 0.15),
    /// rounded to 3 decimals before it meets the minimum
    fn confidence(rsi_extremity: f64, close: f64, band: f64, mid: f64) -> f64 {
        let rsi_bonus = (rsi_extremity / 30.0).clamp(0.0, 1.0) * 0.2;

        let span = (mid - band).abs();
        let band_bonus = if span > 0.0 {
            (1.0 - (close - band).abs() / span).clamp(0.0, 1.0) * 0.15
        } else {
            0.15
        };

        let confidence = (0.6 + rsi_bonus + band_bonus).min(1.0);
        (confidence * 1000.0).round() / 1000.0
    }

    fn enter(&self, market: &MarketSnapshot, action: Action) -> StrategyRecommendation {
        let kind = StrategyKind::MeanReversion;
        let h1 = match market.get(Timeframe::H1) {
            Some(a) => a,
            None => {
                return StrategyRecommendation::hold(
                    kind,
                    format!("[{}] missing 1h analysis", market.symbol),
                )
            }
        };
        let ind = &h1.indicators;

        let (triggered, confidence, band) = match action {
            Action::Long => (
                h1.reversal == ReversalTrigger::Long && ind.bb_lower > 0.0,
                Self::confidence(RSI_OVERSOLD - ind.rsi, ind.close, ind.bb_lower, ind.bb_mid),
                ind.bb_lower,
            ),
            Action::Short => (
                h1.reversal == ReversalTrigger::Short && ind.bb_upper > 0.0,
                Self::confidence(ind.rsi - RSI_OVERBOUGHT, ind.close, ind.bb_upper, ind.bb_mid),
                ind.bb_upper,
            ),
            Action::Hold => (false, 0.0, 0.0),
        };

        if !triggered {
            return StrategyRecommendation::hold(
                kind,
                format!("no reversal setup: rsi {:.1}, close {:.2}", ind.rsi, ind.close),
            );
        }

        tracing::debug!(
            "Mean Reversion {} check: rsi={:.1} close={:.2} band={:.2} mid={:.2} conf={:.3} (min {})",
            action,
            ind.rsi,
            ind.close,
            band,
            ind.bb_mid,
            confidence,
            self.config.min_confidence
        );

        if confidence < self.config.min_confidence {
            return StrategyRecommendation::hold(
                kind,
                format!("reversal setup too weak: confidence {:.3}", confidence),
            );
        }

        let reason = format!(
            "[{}] 1h extreme reversal: RSI {:.1}, close {:.2} at band {:.2}",
            market.symbol, ind.rsi, ind.close, band
        );
        tracing::info!("🎯 MEAN REVERSION {}: {} conf={:.3}", action, reason, confidence);

        StrategyRecommendation::new(kind, action, confidence, reason)
            .with_meta("rsi", ind.rsi)
            .with_meta("close", ind.close)
            .with_meta("band", band)
            .with_meta("bb_mid", ind.bb_mid)
            .with_meta("timeframe", Timeframe::H1.as_str())
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &str {
        "MeanReversion"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::MeanReversion
    }

    fn required_timeframes(&self) -> &[Timeframe] {
        &TIMEFRAMES
    }

    fn should_enter_long(&self, market: &MarketSnapshot) -> StrategyRecommendation {
        self.enter(market, Action::Long)
    }

    fn should_enter_short(&self, market: &MarketSnapshot) -> StrategyRecommendation {
        self.enter(market, Action::Short)
    }

    fn should_exit_position(&self, position: &Position, market: &MarketSnapshot) -> Option<ExitAdvisory> {
        let profit = position.pnl_percent();
        let rsi = market.get(Timeframe::H1).map(|a| a.indicators.rsi);

        let advisory = |kind: ExitKind, confidence: f64, reason: String| ExitAdvisory {
            strategy: StrategyKind::MeanReversion,
            symbol: position.symbol.clone(),
            kind,
            confidence,
            reason,
            reverse_into: None,
        };

        if profit >= self.config.take_profit_pct {
            return Some(advisory(
                ExitKind::TakeProfit,
                0.9,
                format!("[{}] reversal target reached: {:+.2}%", position.symbol, profit),
            ));
        }

        if let Some(rsi) = rsi {
            let neutral = rsi >= self.config.exhaustion_rsi_low && rsi <= self.config.exhaustion_rsi_high;
            if neutral && profit > self.config.exhaustion_min_profit_pct {
                return Some(advisory(
                    ExitKind::SignalExhausted,
                    0.7,
                    format!(
                        "[{}] RSI back to {:.1}, reversal spent at {:+.2}%",
                        position.symbol, rsi, profit
                    ),
                ));
            }
        }

        if profit <= -self.config.stop_loss_pct {
            return Some(advisory(
                ExitKind::StopLoss,
                0.8,
                format!("[{}] reversal failed: {:+.2}%", position.symbol, profit),
            ));
        }

        None
    }
}
