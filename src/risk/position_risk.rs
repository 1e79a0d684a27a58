use crate::models::Position;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loss and profit thresholds for open-position alerts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PositionRiskLimits {
    pub high_loss_pct: f64,
    pub medium_loss_pct: f64,
    pub profit_note_pct: f64,
    pub large_profit_note_pct: f64,
    pub max_hold_hours: f64,
}

impl Default for PositionRiskLimits {
    fn default() -> Self {
        Self {
            high_loss_pct: 5.0,         // -5% unrealized
            medium_loss_pct: 3.0,       // -3% unrealized
            profit_note_pct: 2.0,       // consider a trailing stop
            large_profit_note_pct: 4.0, // consider partial profit
            max_hold_hours: 72.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionRisk {
    pub symbol: String,
    pub pnl_percent: f64,
    pub level: RiskLevel,
    pub notes: Vec<String>,
}

impl PositionRisk {
    /// Anything above Low is worth an alert
    pub fn needs_alert(&self) -> bool {
        self.level > RiskLevel::Low
    }
}

impl PositionRiskLimits {
    pub fn assess(&self, position: &Position, current_price: f64) -> PositionRisk {
        let pnl = position.pnl_percent_at(current_price);
        let mut notes = Vec::new();

        let level = if pnl <= -self.high_loss_pct {
            notes.push(format!("loss {:.2}% beyond {:.1}%: consider closing", pnl, self.high_loss_pct));
            RiskLevel::High
        } else if pnl <= -self.medium_loss_pct {
            notes.push(format!("loss {:.2}%: watch the stop", pnl));
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        if pnl >= self.large_profit_note_pct {
            notes.push(format!("profit {:+.2}%: consider taking partial profit", pnl));
        } else if pnl >= self.profit_note_pct {
            notes.push(format!("profit {:+.2}%: consider moving the stop", pnl));
        }

        PositionRisk {
            symbol: position.symbol.clone(),
            pnl_percent: pnl,
            level,
            notes,
        }
    }

    pub fn held_too_long(&self, held: Duration) -> bool {
        hours(held) > self.max_hold_hours
    }

    /// Like `assess`, plus a note once the position has been held too long
    pub fn assess_held(&self, position: &Position, current_price: f64, held: Duration) -> PositionRisk {
        let mut risk = self.assess(position, current_price);
        if self.held_too_long(held) {
            risk.notes.push(format!("held {:.1}h, longer than {:.0}h", hours(held), self.max_hold_hours));
        }
        risk
    }
}

fn hours(d: Duration) -> f64 {
    d.num_seconds() as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionSide;

    fn position(side: PositionSide) -> Position {
        Position {
            symbol: "BTC/USDT".to_string(),
            side,
            entry_price: 100.0,
            size: 1.0,
            mark_price: 100.0,
            unrealized_pnl: 0.0,
        }
    }

    #[test]
    fn test_long_loss_levels() {
        let limits = PositionRiskLimits::default();
        let pos = position(PositionSide::Long);

        assert_eq!(limits.assess(&pos, 94.0).level, RiskLevel::High);
        assert_eq!(limits.assess(&pos, 95.0).level, RiskLevel::High);
        assert_eq!(limits.assess(&pos, 96.5).level, RiskLevel::Medium);
        assert_eq!(limits.assess(&pos, 98.0).level, RiskLevel::Low);
        assert!(!limits.assess(&pos, 98.0).needs_alert());
    }

    #[test]
    fn test_short_loss_is_price_rising() {
        let limits = PositionRiskLimits::default();
        let risk = limits.assess(&position(PositionSide::Short), 106.0);
        assert_eq!(risk.level, RiskLevel::High);
        assert!(risk.needs_alert());
    }

    #[test]
    fn test_profit_notes() {
        let limits = PositionRiskLimits::default();
        let pos = position(PositionSide::Long);

        let small = limits.assess(&pos, 102.5);
        assert_eq!(small.level, RiskLevel::Low);
        assert!(small.notes[0].contains("moving the stop"));

        let large = limits.assess(&pos, 105.0);
        assert!(large.notes[0].contains("partial profit"));

        assert!(limits.assess(&pos, 101.0).notes.is_empty());
    }

    #[test]
    fn test_long_hold_note() {
        let limits = PositionRiskLimits::default();
        let pos = position(PositionSide::Long);

        assert!(limits.assess_held(&pos, 100.0, Duration::hours(72)).notes.is_empty());

        let stale = limits.assess_held(&pos, 100.0, Duration::hours(73));
        assert_eq!(stale.level, RiskLevel::Low);
        assert_eq!(stale.notes, vec!["held 73.0h, longer than 72h".to_string()]);
    }
}
