use crate::models::{Position, PositionSide, Timeframe};
use crate::signals::{is_trending, signal_strength, TimeframeAnalysis};
use crate::strategy::{
    ExitAdvisory, ExitKind, MarketSnapshot, Strategy, StrategyKind, StrategyRecommendation,
    TrendPreset,
};

const TIMEFRAMES: [Timeframe; 3] = [Timeframe::D1, Timeframe::H4, Timeframe::H1];

/// Triple-timeframe trend follower
///
/// Enters long when the daily and 4h composite scores are both positive and
/// the 1h timeframe shows a buy signal at or above the symbol's strong
/// threshold. Shorts mirror this with negative scores and sell signals.
///
/// Presets may add a weak-signal path gated by signal strength (and
/// optionally a trending market), and emergency levels that lower the
/// strong threshold after days without a trade plan.
#[derive(Debug, Clone)]
pub struct TrendFollowingStrategy {
    preset: TrendPreset,
    max_score: f64,
}

struct Frames<'a> {
    daily: &'a TimeframeAnalysis,
    h4: &'a TimeframeAnalysis,
    h1: &'a TimeframeAnalysis,
}

impl TrendFollowingStrategy {
    /// `max_score` is the scorer's largest |composite|, used to normalize the score bonus
    pub fn new(preset: TrendPreset, max_score: f64) -> Self {
        Self {
            preset,
            max_score: if max_score > 0.0 { max_score } else { 5.0 },
        }
    }

    pub fn preset(&self) -> &TrendPreset {
        &self.preset
    }

    fn frames<'a>(&self, market: &'a MarketSnapshot) -> Result<Frames<'a>, String> {
        let get = |tf: Timeframe| {
            market
                .get(tf)
                .ok_or_else(|| format!("[{}] missing {} analysis", market.symbol, tf))
        };
        Ok(Frames {
            daily: get(Timeframe::D1)?,
            h4: get(Timeframe::H4)?,
            h1: get(Timeframe::H1)?,
        })
    }

    fn confidence(&self, daily: f64, h4: f64, signal_bonus: f64) -> f64 {
        let score_bonus = 0.2 * (daily + h4).abs() / (2.0 * self.max_score);
        let confidence = (0.6 + score_bonus + signal_bonus).min(1.0);
        (confidence * 1000.0).round() / 1000.0
    }

    /// Strong threshold after any emergency relaxation, plus the active level
    fn effective_strong(&self, market: &MarketSnapshot) -> (f64, Option<usize>) {
        let strong = market.thresholds.strong;
        match self.preset.emergency_level(market.idle_days) {
            Some((level, e)) if e.strong_threshold < strong => (e.strong_threshold, Some(level)),
            _ => (strong, None),
        }
    }

    fn enter(&self, market: &MarketSnapshot, side: PositionSide) -> StrategyRecommendation {
        let kind = StrategyKind::TrendFollowing;
        let frames = match self.frames(market) {
            Ok(f) => f,
            Err(reason) => return StrategyRecommendation::hold(kind, reason),
        };

        let dir = side.sign();
        let daily = frames.daily.composite() * dir;
        let h4 = frames.h4.composite() * dir;
        let h1 = frames.h1.composite() * dir;
        let h1_signal = frames.h1.signal();
        let signal_matches = match side {
            PositionSide::Long => h1_signal.is_buy(),
            PositionSide::Short => h1_signal.is_sell(),
        };

        let strength = signal_strength(
            frames.daily.composite(),
            frames.h4.composite(),
            frames.h1.composite(),
            &frames.h1.indicators,
        );
        let (strong, emergency) = self.effective_strong(market);
        let action = side.entry_action();
        let direction = match side {
            PositionSide::Long => "bullish",
            PositionSide::Short => "bearish",
        };

        // Strong path; under emergency a positive 1h score replaces the signal check
        let h1_ok = match emergency {
            Some(_) => h1 > 0.0 && h1 >= strong,
            None => signal_matches && h1 >= strong,
        };
        if daily > 0.0 && h4 > 0.0 && h1_ok && strength >= self.preset.strong_min_strength {
            let bonus = if h1_signal.is_strong() && emergency.is_none() { 0.2 } else { 0.1 };
            let confidence = self.confidence(daily, h4, bonus);
            let mut reason = format!(
                "[{}] 1d ({:+.1}) and 4h ({:+.1}) {}, 1h {} ({:+.1})",
                market.symbol,
                frames.daily.composite(),
                frames.h4.composite(),
                direction,
                h1_signal,
                frames.h1.composite()
            );
            if let Some(level) = emergency {
                reason.push_str(&format!(" [emergency L{}]", level));
            }
            tracing::info!("📈 TREND {}: {} conf={:.3}", action, reason, confidence);
            let mut rec = StrategyRecommendation::new(kind, action, confidence, reason)
                .with_meta("daily_score", frames.daily.composite())
                .with_meta("h4_score", frames.h4.composite())
                .with_meta("h1_score", frames.h1.composite())
                .with_meta("h1_signal", h1_signal.to_string())
                .with_meta("signal_strength", strength)
                .with_meta("entry_path", "strong");
            if let Some(level) = emergency {
                rec = rec.with_meta("emergency_level", level as f64);
            }
            return rec;
        }

        // Weak path
        if self.preset.weak_entries
            && daily >= 0.0
            && h4 >= 0.0
            && h1 >= market.thresholds.weak
            && strength >= self.preset.weak_min_strength
            && (!self.preset.require_trending
                || is_trending(&frames.h1.indicators, self.preset.trending_threshold))
        {
            let confidence = self.confidence(daily, h4, 0.0);
            let reason = format!(
                "[{}] weak {} setup: 1d ({:+.1}) 4h ({:+.1}) 1h ({:+.1}) strength {:.1}",
                market.symbol,
                direction,
                frames.daily.composite(),
                frames.h4.composite(),
                frames.h1.composite(),
                strength
            );
            tracing::info!("📈 TREND {} (weak): {} conf={:.3}", action, reason, confidence);
            return StrategyRecommendation::new(kind, action, confidence, reason)
                .with_meta("daily_score", frames.daily.composite())
                .with_meta("h4_score", frames.h4.composite())
                .with_meta("h1_score", frames.h1.composite())
                .with_meta("signal_strength", strength)
                .with_meta("entry_path", "weak");
        }

        tracing::debug!(
            "[{}] trend {} conditions not met: 1d({:+.1}) 4h({:+.1}) 1h({} {:+.1}) strength {:.1}",
            market.symbol,
            direction,
            frames.daily.composite(),
            frames.h4.composite(),
            h1_signal,
            frames.h1.composite(),
            strength
        );
        StrategyRecommendation::hold(
            kind,
            format!(
                "trend conditions not met: 1d({:+.1}) 4h({:+.1}) 1h({})",
                frames.daily.composite(),
                frames.h4.composite(),
                h1_signal
            ),
        )
    }
}

impl Strategy for TrendFollowingStrategy {
    fn name(&self) -> &str {
        "TrendFollowing"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::TrendFollowing
    }

    fn required_timeframes(&self) -> &[Timeframe] {
        &TIMEFRAMES
    }

    fn should_enter_long(&self, market: &MarketSnapshot) -> StrategyRecommendation {
        self.enter(market, PositionSide::Long)
    }

    fn should_enter_short(&self, market: &MarketSnapshot) -> StrategyRecommendation {
        self.enter(market, PositionSide::Short)
    }

    fn should_exit_position(&self, position: &Position, market: &MarketSnapshot) -> Option<ExitAdvisory> {
        let h1 = market.get(Timeframe::H1)?;
        let signal = h1.signal();
        let opposing = match position.side {
            PositionSide::Long => signal.is_sell(),
            PositionSide::Short => signal.is_buy(),
        };
        if !opposing {
            return None;
        }

        let reverse_into = position.side.opposite().entry_action();
        Some(ExitAdvisory {
            strategy: StrategyKind::TrendFollowing,
            symbol: position.symbol.clone(),
            kind: ExitKind::OpposingSignal,
            confidence: self.preset.exit_confidence,
            reason: format!(
                "[{}] reversal signal: holding {}, 1h now {} ({:+.1})",
                position.symbol,
                position.side,
                signal,
                h1.composite()
            ),
            reverse_into: Some(reverse_into),
        })
    }
}
