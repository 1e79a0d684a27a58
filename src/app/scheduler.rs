use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::HashMap;

/// State carried between analysis cycles
///
/// Owned by the analysis loop and passed into each cycle by `&mut`.
#[derive(Debug, Clone)]
pub struct SchedulerState {
    started_at: DateTime<Utc>,
    alert_cooldown: Duration,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub consecutive_failed_cycles: u32,
    pub cycles_run: u64,
    last_plan_at: HashMap<String, DateTime<Utc>>,
}

impl SchedulerState {
    pub fn new(started_at: DateTime<Utc>, alert_cooldown_minutes: i64) -> Self {
        Self {
            started_at,
            alert_cooldown: Duration::minutes(alert_cooldown_minutes.max(0)),
            last_cycle_at: None,
            last_alert_at: None,
            consecutive_failed_cycles: 0,
            cycles_run: 0,
            last_plan_at: HashMap::new(),
        }
    }

    /// Days since a plan was last emitted for `symbol` (or since startup)
    pub fn idle_days(&self, symbol: &str, now: DateTime<Utc>) -> f64 {
        let since = self.last_plan_at.get(symbol).copied().unwrap_or(self.started_at);
        ((now - since).num_seconds().max(0) as f64) / 86_400.0
    }

    pub fn record_plan(&mut self, symbol: &str, at: DateTime<Utc>) {
        self.last_plan_at.insert(symbol.to_string(), at);
    }

    pub fn last_plan_at(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.last_plan_at.get(symbol).copied()
    }

    /// Marks a finished cycle; `failed` means no symbol could be analyzed
    pub fn record_cycle(&mut self, at: DateTime<Utc>, failed: bool) {
        self.last_cycle_at = Some(at);
        self.cycles_run += 1;
        if failed {
            self.consecutive_failed_cycles += 1;
        } else {
            self.consecutive_failed_cycles = 0;
        }
    }

    /// True (and starts a new cooldown) if no alert went out within the cooldown
    pub fn try_alert(&mut self, now: DateTime<Utc>) -> bool {
        match self.last_alert_at {
            Some(last) if now - last < self.alert_cooldown => false,
            _ => {
                self.last_alert_at = Some(now);
                true
            }
        }
    }
}

/// Next HH:`minute`:00 strictly after `now`
pub fn next_run_at(now: DateTime<Utc>, minute: u32) -> DateTime<Utc> {
    let hour_start = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
    let candidate = hour_start + Duration::minutes(i64::from(minute.min(59)));
    if candidate > now {
        candidate
    } else {
        candidate + Duration::hours(1)
    }
}
