use crate::models::{Position, PositionSide};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Suggested new stop for an open position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopAdvisory {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub current_price: f64,
    pub new_stop_loss: f64,
    pub reason: String,
    pub atr_value: f64,
    pub atr_multiplier: f64,
    pub created_at: DateTime<Utc>,
}

impl StopAdvisory {
    /// Profit locked in if the suggested stop is hit, as % of entry
    pub fn locked_percent(&self) -> f64 {
        self.side.sign() * (self.new_stop_loss - self.entry_price) / self.entry_price * 100.0
    }
}

/// Once price has moved more than one stop distance in the trade's favour,
/// suggests a stop one distance behind price, provided it locks in profit.
pub fn trailing_stop(position: &Position, current_price: f64, atr: f64, atr_multiplier: f64) -> Option<f64> {
    if !(atr > 0.0) || !current_price.is_finite() || position.entry_price <= 0.0 {
        return None;
    }
    let distance = atr * atr_multiplier;
    let entry = position.entry_price;

    match position.side {
        PositionSide::Long if current_price > entry + distance => {
            let stop = current_price - distance;
            (stop > entry).then_some(stop)
        }
        PositionSide::Short if current_price < entry - distance => {
            let stop = current_price + distance;
            (stop < entry).then_some(stop)
        }
        _ => None,
    }
}

/// Remembers the best stop suggested per position so advisories never loosen
#[derive(Debug, Default)]
pub struct TrailingStopTracker {
    best: HashMap<(String, PositionSide), f64>,
}

impl TrailingStopTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an advisory only when the new stop improves on the last one
    pub fn update(
        &mut self,
        position: &Position,
        current_price: f64,
        atr: f64,
        atr_multiplier: f64,
        now: DateTime<Utc>,
    ) -> Option<StopAdvisory> {
        let stop = trailing_stop(position, current_price, atr, atr_multiplier)?;
        let key = (position.symbol.clone(), position.side);

        if let Some(&previous) = self.best.get(&key) {
            let improves = match position.side {
                PositionSide::Long => stop > previous,
                PositionSide::Short => stop < previous,
            };
            if !improves {
                tracing::debug!(
                    "{} trailing stop {:.4} does not improve on {:.4}",
                    position.symbol,
                    stop,
                    previous
                );
                return None;
            }
        }

        self.best.insert(key, stop);

        let reason = format!(
            "price {:.4} is more than {:.1} x ATR {:.4} past entry {:.4}; trail stop to lock profit",
            current_price, atr_multiplier, atr, position.entry_price
        );

        Some(StopAdvisory {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            current_price,
            new_stop_loss: stop,
            reason,
            atr_value: atr,
            atr_multiplier,
            created_at: now,
        })
    }

    pub fn current(&self, symbol: &str, side: PositionSide) -> Option<f64> {
        self.best.get(&(symbol.to_string(), side)).copied()
    }

    /// Forgets positions that are no longer open
    pub fn retain_open(&mut self, positions: &[Position]) {
        let before = self.best.len();
        self.best
            .retain(|(symbol, side), _| positions.iter().any(|p| &p.symbol == symbol && p.side == *side));
        let removed = before - self.best.len();
        if removed > 0 {
            tracing::debug!("Dropped {} closed position(s) from trailing stops", removed);
        }
    }

    pub fn len(&self) -> usize {
        self.best.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn position(side: PositionSide) -> Position {
        Position {
            symbol: "SOL/USDT".to_string(),
            side,
            entry_price: 100.0,
            size: 10.0,
            mark_price: 100.0,
            unrealized_pnl: 0.0,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_long_trails_once_past_one_distance() {
        let pos = position(PositionSide::Long);
        // distance = 2 * 2.5 = 5
        assert_eq!(trailing_stop(&pos, 104.0, 2.0, 2.5), None);
        assert_eq!(trailing_stop(&pos, 105.0, 2.0, 2.5), None);
        assert_eq!(trailing_stop(&pos, 108.0, 2.0, 2.5), Some(103.0));
    }

    #[test]
    fn test_short_mirror() {
        let pos = position(PositionSide::Short);
        assert_eq!(trailing_stop(&pos, 96.0, 2.0, 2.5), None);
        assert_eq!(trailing_stop(&pos, 90.0, 2.0, 2.5), Some(95.0));
    }

    #[test]
    fn test_degenerate_atr_gives_nothing() {
        let pos = position(PositionSide::Long);
        assert_eq!(trailing_stop(&pos, 150.0, 0.0, 2.0), None);
        assert_eq!(trailing_stop(&pos, 150.0, f64::NAN, 2.0), None);
    }

    #[test]
    fn test_tracker_never_loosens() {
        let mut tracker = TrailingStopTracker::new();
        let pos = position(PositionSide::Long);

        let first = tracker.update(&pos, 110.0, 2.0, 2.0, now()).unwrap();
        assert_eq!(first.new_stop_loss, 106.0);
        assert!((first.locked_percent() - 6.0).abs() < 1e-9);

        // Pullback: would suggest 103, which is worse
        assert!(tracker.update(&pos, 107.0, 2.0, 2.0, now()).is_none());
        assert_eq!(tracker.current("SOL/USDT", PositionSide::Long), Some(106.0));

        let next = tracker.update(&pos, 115.0, 2.0, 2.0, now()).unwrap();
        assert_eq!(next.new_stop_loss, 111.0);
    }

    #[test]
    fn test_tracker_short_and_cleanup() {
        let mut tracker = TrailingStopTracker::new();
        let pos = position(PositionSide::Short);

        assert_eq!(tracker.update(&pos, 90.0, 1.0, 2.0, now()).unwrap().new_stop_loss, 92.0);
        assert!(tracker.update(&pos, 93.0, 1.0, 2.0, now()).is_none());
        assert_eq!(tracker.len(), 1);

        tracker.retain_open(&[]);
        assert!(tracker.is_empty());
    }
}
