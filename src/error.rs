use thiserror::Error;

/// Raised when a candle series cannot produce a full indicator row.
///
/// Treated as a routine skip by the analysis cycle, never as a crash.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndicatorError {
    /// Too few candles, or the last closed row still has an undefined value.
    #[error("insufficient data: need {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },
}

/// Failures talking to the exchange.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode exchange payload: {0}")]
    Decode(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("authentication required: {0}")]
    Auth(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SizingError {
    #[error("ATR must be positive and finite, got {0}")]
    DegenerateAtr(f64),

    #[error("account balance must be positive, got {0}")]
    ZeroBalance(f64),

    #[error("entry price must be positive and finite, got {0}")]
    InvalidPrice(f64),

    #[error("decision is not tradable: {0}")]
    NotTradable(String),

    #[error("trade plan failed validation: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("symbol {symbol}: missing `{field}` and no DEFAULT entry")]
    MissingField { symbol: String, field: &'static str },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
