use crate::decision::Decision;
use crate::error::SizingError;
use crate::models::{PositionSide, Timeframe};
use crate::strategy::StrategyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Allowed relative error between the plan's stop distance and ATR × multiplier
const DISTANCE_TOLERANCE: f64 = 0.01;
/// Allowed relative error between realized and intended risk
const RISK_TOLERANCE: f64 = 0.05;

/// How much to risk and where to put the stop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskProfile {
    /// Percent of balance risked per trade
    pub risk_percent: f64,
    pub atr_multiplier: f64,
    /// R-multiples for the primary and extended targets
    pub target_multiples: Vec<f64>,
}

impl RiskProfile {
    pub fn trend(risk_percent: f64, atr_multiplier: f64) -> Self {
        Self {
            risk_percent,
            atr_multiplier,
            target_multiples: vec![2.0, 3.0],
        }
    }
}

impl Default for RiskProfile {
    /// Mean-reversion trades: smaller risk, tighter stop, closer targets
    fn default() -> Self {
        Self {
            risk_percent: 0.8,
            atr_multiplier: 1.5,
            target_multiples: vec![1.5, 2.0],
        }
    }
}

/// ATR reading the stop is derived from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AtrReading {
    pub value: f64,
    pub timeframe: Timeframe,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfitTarget {
    pub r_multiple: f64,
    pub price: f64,
    pub profit_usd: f64,
}

/// Sized, ready-to-publish trade signal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradePlan {
    pub id: Uuid,
    pub decision_id: Uuid,
    pub symbol: String,
    pub direction: PositionSide,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub stop_loss_distance: f64,
    pub position_size_coin: f64,
    pub position_size_usd: f64,
    pub risk_amount_usd: f64,
    pub risk_percent: f64,
    pub targets: Vec<ProfitTarget>,
    pub atr_value: f64,
    pub atr_multiplier: f64,
    pub atr_timeframe: Timeframe,
    pub atr_length: usize,
    pub confidence: f64,
    pub strategy: Option<StrategyKind>,
    pub reversal: bool,
    pub decision_reason: String,
    pub created_at: DateTime<Utc>,
}

impl TradePlan {
    /// Loss if the stop is hit
    pub fn realized_risk(&self) -> f64 {
        self.position_size_coin * (self.entry_price - self.stop_loss_price).abs()
    }
}

/// Turns a decision into a [`TradePlan`]
///
/// size = balance × risk% / (ATR × multiplier). Every plan passes
/// [`PositionSizer::validate_plan`] before it is returned.
#[derive(Debug, Clone, Default)]
pub struct PositionSizer;

impl PositionSizer {
    pub fn new() -> Self {
        Self
    }

    pub fn size(
        &self,
        decision: &Decision,
        entry_price: f64,
        atr: AtrReading,
        balance: f64,
        profile: &RiskProfile,
    ) -> Result<TradePlan, SizingError> {
        let direction = decision
            .action
            .side()
            .ok_or_else(|| SizingError::NotTradable(format!("{} for {}", decision.action, decision.symbol)))?;

        if !atr.value.is_finite() || atr.value <= 0.0 {
            return Err(SizingError::DegenerateAtr(atr.value));
        }
        if !balance.is_finite() || balance <= 0.0 {
            return Err(SizingError::ZeroBalance(balance));
        }
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(SizingError::InvalidPrice(entry_price));
        }

        let distance = atr.value * profile.atr_multiplier;
        let stop_loss_price = entry_price - direction.sign() * distance;
        if stop_loss_price <= 0.0 {
            return Err(SizingError::ValidationFailed(format!(
                "stop {:.4} at or below zero (entry {:.4}, distance {:.4})",
                stop_loss_price, entry_price, distance
            )));
        }

        let risk_amount = balance * profile.risk_percent / 100.0;
        let size_coin = risk_amount / distance;

        let targets = profile
            .target_multiples
            .iter()
            .map(|&r| ProfitTarget {
                r_multiple: r,
                price: entry_price + direction.sign() * distance * r,
                profit_usd: risk_amount * r,
            })
            .collect();

        let plan = TradePlan {
            id: Uuid::new_v4(),
            decision_id: decision.id,
            symbol: decision.symbol.clone(),
            direction,
            entry_price,
            stop_loss_price,
            stop_loss_distance: distance,
            position_size_coin: size_coin,
            position_size_usd: size_coin * entry_price,
            risk_amount_usd: risk_amount,
            risk_percent: profile.risk_percent,
            targets,
            atr_value: atr.value,
            atr_multiplier: profile.atr_multiplier,
            atr_timeframe: atr.timeframe,
            atr_length: atr.length,
            confidence: decision.confidence,
            strategy: decision.lead_strategy,
            reversal: decision.is_reversal(),
            decision_reason: decision.reason.clone(),
            created_at: decision.timestamp,
        };

        self.validate_plan(&plan, profile, balance)?;

        tracing::info!(
            "{} sized: {} {:.6} @ {:.4}, stop {:.4}, risk ${:.2}",
            plan.symbol,
            plan.direction,
            plan.position_size_coin,
            plan.entry_price,
            plan.stop_loss_price,
            plan.risk_amount_usd
        );

        Ok(plan)
    }

    /// Recomputes distance and risk from the configured profile.
    ///
    /// Fails on > 1% distance error, > 5% risk error, a non-positive size,
    /// or a stop that is not strictly worse than entry.
    pub fn validate_plan(&self, plan: &TradePlan, profile: &RiskProfile, balance: f64) -> Result<(), SizingError> {
        let expected_distance = plan.atr_value * profile.atr_multiplier;
        let distance_error = relative_error(plan.stop_loss_distance, expected_distance);
        if distance_error > DISTANCE_TOLERANCE {
            tracing::warn!(
                "{} stop distance off: expected {:.4}, got {:.4} ({:.2}%)",
                plan.symbol,
                expected_distance,
                plan.stop_loss_distance,
                distance_error * 100.0
            );
            return Err(SizingError::ValidationFailed(format!(
                "stop distance {:.4} vs expected {:.4}",
                plan.stop_loss_distance, expected_distance
            )));
        }

        let expected_risk = balance * profile.risk_percent / 100.0;
        let risk_error = relative_error(plan.realized_risk(), expected_risk);
        if risk_error > RISK_TOLERANCE {
            tracing::warn!(
                "{} risk off: expected ${:.2}, got ${:.2} ({:.2}%)",
                plan.symbol,
                expected_risk,
                plan.realized_risk(),
                risk_error * 100.0
            );
            return Err(SizingError::ValidationFailed(format!(
                "risk {:.2} vs expected {:.2}",
                plan.realized_risk(),
                expected_risk
            )));
        }

        if !(plan.position_size_coin > 0.0) {
            return Err(SizingError::ValidationFailed(format!(
                "non-positive size {}",
                plan.position_size_coin
            )));
        }

        let stop_is_worse = match plan.direction {
            PositionSide::Long => plan.stop_loss_price < plan.entry_price,
            PositionSide::Short => plan.stop_loss_price > plan.entry_price,
        };
        if !stop_is_worse {
            return Err(SizingError::ValidationFailed(format!(
                "stop {:.4} not beyond entry {:.4} for {}",
                plan.stop_loss_price, plan.entry_price, plan.direction
            )));
        }

        Ok(())
    }
}

fn relative_error(actual: f64, expected: f64) -> f64 {
    if expected > 0.0 && actual.is_finite() {
        (actual - expected).abs() / expected
    } else {
        f64::INFINITY
    }
}
