use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV candlestick, ordered oldest first in every series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Candle interval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// Exchange interval string (also the config spelling)
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::M15 => 15 * 60,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 4 * 3600,
            Timeframe::D1 => 24 * 3600,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(format!("unsupported timeframe '{}'", other)),
        }
    }
}

/// What a strategy or the decision engine wants done
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    #[serde(rename = "EXECUTE_LONG")]
    Long,
    #[serde(rename = "EXECUTE_SHORT")]
    Short,
    #[serde(rename = "HOLD")]
    Hold,
}

impl Action {
    pub fn is_entry(&self) -> bool {
        !matches!(self, Action::Hold)
    }

    pub fn side(&self) -> Option<PositionSide> {
        match self {
            Action::Long => Some(PositionSide::Long),
            Action::Short => Some(PositionSide::Short),
            Action::Hold => None,
        }
    }

    pub fn opposes(&self, side: PositionSide) -> bool {
        self.side().is_some_and(|s| s != side)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Long => "EXECUTE_LONG",
            Action::Short => "EXECUTE_SHORT",
            Action::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    pub fn entry_action(&self) -> Action {
        match self {
            PositionSide::Long => Action::Long,
            PositionSide::Short => Action::Short,
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("LONG"),
            PositionSide::Short => f.write_str("SHORT"),
        }
    }
}

/// Open position as reported by the exchange (read-only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub size: f64,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
}

impl Position {
    /// Unrealized profit in percent of entry, sign-adjusted for the side
    pub fn pnl_percent(&self) -> f64 {
        self.pnl_percent_at(self.mark_price)
    }

    pub fn pnl_percent_at(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.side.sign() * (price - self.entry_price) / self.entry_price * 100.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct AccountBalance {
    pub wallet: f64,
    pub available: f64,
    pub unrealized_pnl: f64,
}
