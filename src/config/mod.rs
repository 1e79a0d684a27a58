// Application configuration
//
// Layered: config/default.toml, optional config/local.toml, then
// TRENDBOT__SECTION__KEY environment overrides. API secrets come from
// BINANCE_API_KEY / BINANCE_API_SECRET.

use crate::decision::DecisionConfig;
use crate::error::ConfigError;
use crate::models::Timeframe;
use crate::risk::{PositionRiskLimits, RiskProfile};
use crate::signals::{ScoringConfig, SignalThresholds};
use crate::strategy::{MeanReversionConfig, PresetName, StrategyKind};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_SYMBOL_KEY: &str = "DEFAULT";

const MIN_RISK_PERCENT: f64 = 0.1;
const MAX_RISK_PERCENT: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub symbols: Vec<String>,
    /// Minute past the hour the analysis cycle runs at
    pub run_at_minute: u32,
    pub monitor_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub candle_limit: usize,
    pub alert_cooldown_minutes: i64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string(), "SOL/USDT".to_string()],
            run_at_minute: 1,
            monitor_interval_secs: 15,
            request_timeout_secs: 10,
            candle_limit: 400,
            alert_cooldown_minutes: 60,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub recv_window_ms: u64,
    pub requests_per_minute: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fapi.binance.com".to_string(),
            api_key: None,
            secret_key: None,
            recv_window_ms: 5000,
            requests_per_minute: 1200,
        }
    }
}

// Keep secrets out of logs
impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("recv_window_ms", &self.recv_window_ms)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub preset: PresetName,
    pub scoring: ScoringConfig,
    pub decision: DecisionConfig,
    pub mean_reversion: MeanReversionConfig,
    pub disabled: Vec<StrategyKind>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            preset: PresetName::default(),
            scoring: ScoringConfig::default(),
            decision: DecisionConfig::default(),
            mean_reversion: MeanReversionConfig::default(),
            disabled: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    /// Profile used when mean reversion leads a decision
    pub reversal: RiskProfile,
    pub limits: PositionRiskLimits,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            reversal: RiskProfile::default(),
            limits: PositionRiskLimits::default(),
        }
    }
}

/// Per-symbol entry as written in the file; missing fields fall back to DEFAULT
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SymbolOverrides {
    pub atr_timeframe: Option<Timeframe>,
    pub atr_length: Option<usize>,
    pub atr_multiplier: Option<f64>,
    pub risk_percent: Option<f64>,
    pub strong_signal_threshold: Option<f64>,
    pub weak_signal_threshold: Option<f64>,
}

/// Fully resolved settings for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolConfig {
    pub symbol: String,
    pub atr_timeframe: Timeframe,
    pub atr_length: usize,
    pub atr_multiplier: f64,
    pub risk_percent: f64,
    pub thresholds: SignalThresholds,
}

impl SymbolConfig {
    pub fn risk_profile(&self) -> RiskProfile {
        RiskProfile::trend(self.risk_percent, self.atr_multiplier)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub exchange: ExchangeConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub symbols: HashMap<String, SymbolOverrides>,
}

impl AppConfig {
    /// Loads `dir/default.toml`, then `dir/local.toml` if present, then env overrides
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let settings = Config::builder()
            .add_source(File::from(dir.join("default.toml")).required(false))
            .add_source(File::from(dir.join("local.toml")).required(false))
            .add_source(Environment::with_prefix("TRENDBOT").separator("__"))
            .build()?;

        let mut cfg: AppConfig = settings.try_deserialize()?;
        cfg.apply_env_secrets();
        cfg.validate()?;

        tracing::info!(
            "⚙️  Loaded config from {}: {} symbols, preset {}",
            dir.display(),
            cfg.runtime.symbols.len(),
            cfg.strategy.preset
        );
        Ok(cfg)
    }

    /// Builds from an in-memory TOML document
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let cfg: AppConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_secrets(&mut self) {
        if let Ok(key) = std::env::var("BINANCE_API_KEY") {
            if !key.is_empty() {
                self.exchange.api_key = Some(key);
            }
        }
        if let Ok(secret) = std::env::var("BINANCE_API_SECRET") {
            if !secret.is_empty() {
                self.exchange.secret_key = Some(secret);
            }
        }
    }

    fn overrides_for(&self, symbol: &str) -> Option<&SymbolOverrides> {
        self.symbols
            .get(symbol)
            .or_else(|| self.symbols.iter().find(|(k, _)| k.eq_ignore_ascii_case(symbol)).map(|(_, v)| v))
    }

    /// Merges a symbol's entry over DEFAULT; a field set in neither is an error
    pub fn symbol_config(&self, symbol: &str) -> Result<SymbolConfig, ConfigError> {
        let own = self.overrides_for(symbol);
        let default = self.overrides_for(DEFAULT_SYMBOL_KEY);

        macro_rules! resolve {
            ($field:ident) => {
                own.and_then(|o| o.$field)
                    .or_else(|| default.and_then(|d| d.$field))
                    .ok_or_else(|| ConfigError::MissingField {
                        symbol: symbol.to_string(),
                        field: stringify!($field),
                    })?
            };
        }

        Ok(SymbolConfig {
            symbol: symbol.to_string(),
            atr_timeframe: resolve!(atr_timeframe),
            atr_length: resolve!(atr_length),
            atr_multiplier: resolve!(atr_multiplier),
            risk_percent: resolve!(risk_percent),
            thresholds: SignalThresholds {
                strong: resolve!(strong_signal_threshold),
                weak: resolve!(weak_signal_threshold),
            },
        })
    }

    /// Resolved settings for every configured symbol, in configured order
    pub fn symbol_configs(&self) -> Result<Vec<SymbolConfig>, ConfigError> {
        self.runtime.symbols.iter().map(|s| self.symbol_config(s)).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.runtime.symbols.is_empty() {
            problems.push("runtime.symbols is empty".to_string());
        }
        if self.runtime.run_at_minute > 59 {
            problems.push(format!("runtime.run_at_minute {} must be 0..=59", self.runtime.run_at_minute));
        }
        if self.runtime.monitor_interval_secs == 0 {
            problems.push("runtime.monitor_interval_secs must be > 0".to_string());
        }
        if self.runtime.request_timeout_secs == 0 {
            problems.push("runtime.request_timeout_secs must be > 0".to_string());
        }
        if self.runtime.alert_cooldown_minutes < 0 {
            problems.push("runtime.alert_cooldown_minutes must be >= 0".to_string());
        }

        let min_candles = self.strategy.preset.preset().indicators.warmup_rows().max(50) + 1;
        if self.runtime.candle_limit < min_candles {
            problems.push(format!(
                "runtime.candle_limit {} below the {} candles preset {} needs",
                self.runtime.candle_limit, min_candles, self.strategy.preset
            ));
        }

        let weights = &self.strategy.decision.weights;
        if weights.trend_following <= 0.0 || weights.mean_reversion <= 0.0 {
            problems.push(format!(
                "strategy weights must be > 0 (trend_following {}, mean_reversion {})",
                weights.trend_following, weights.mean_reversion
            ));
        }
        for (name, v) in [
            ("min_confidence_threshold", self.strategy.decision.min_confidence_threshold),
            ("reversal_confidence_threshold", self.strategy.decision.reversal_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                problems.push(format!("strategy.decision.{} {} must be in [0, 1]", name, v));
            }
        }

        let scoring = &self.strategy.scoring;
        if scoring.reversal_rsi_oversold >= scoring.reversal_rsi_overbought {
            problems.push(format!(
                "reversal_rsi_oversold {} must be below reversal_rsi_overbought {}",
                scoring.reversal_rsi_oversold, scoring.reversal_rsi_overbought
            ));
        }

        if !(MIN_RISK_PERCENT..=MAX_RISK_PERCENT).contains(&self.risk.reversal.risk_percent) {
            problems.push(format!(
                "risk.reversal.risk_percent {} outside {}..={}",
                self.risk.reversal.risk_percent, MIN_RISK_PERCENT, MAX_RISK_PERCENT
            ));
        }

        for symbol in &self.runtime.symbols {
            let sc = self.symbol_config(symbol)?;
            if !(MIN_RISK_PERCENT..=MAX_RISK_PERCENT).contains(&sc.risk_percent) {
                problems.push(format!(
                    "{}: risk_percent {} outside {}..={}",
                    symbol, sc.risk_percent, MIN_RISK_PERCENT, MAX_RISK_PERCENT
                ));
            }
            if !(sc.atr_multiplier > 0.0) {
                problems.push(format!("{}: atr_multiplier must be > 0", symbol));
            }
            if sc.atr_length == 0 {
                problems.push(format!("{}: atr_length must be > 0", symbol));
            }
            if !(sc.thresholds.weak > 0.0 && sc.thresholds.strong >= sc.thresholds.weak) {
                problems.push(format!(
                    "{}: thresholds need 0 < weak ({}) <= strong ({})",
                    symbol, sc.thresholds.weak, sc.thresholds.strong
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[runtime]
symbols = ["BTC/USDT", "ETH/USDT"]
run_at_minute = 1

[strategy]
preset = "v2_3"

[strategy.decision.weights]
trend_following = 0.7
mean_reversion = 0.3

[symbols.DEFAULT]
atr_timeframe = "1d"
atr_length = 14
atr_multiplier = 2.0
risk_percent = 2.0
strong_signal_threshold = 2.0
weak_signal_threshold = 1.0

[symbols."ETH/USDT"]
atr_timeframe = "4h"
atr_length = 20
atr_multiplier = 1.8
"#;

    #[test]
    fn test_symbol_falls_back_to_default() {
        let cfg = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.strategy.preset, PresetName::V2_3);

        let btc = cfg.symbol_config("BTC/USDT").unwrap();
        assert_eq!(btc.atr_timeframe, Timeframe::D1);
        assert_eq!(btc.atr_length, 14);
        assert_eq!(btc.risk_percent, 2.0);

        let eth = cfg.symbol_config("ETH/USDT").unwrap();
        assert_eq!(eth.atr_timeframe, Timeframe::H4);
        assert_eq!(eth.atr_length, 20);
        assert_eq!(eth.atr_multiplier, 1.8);
        assert_eq!(eth.risk_percent, 2.0);
        assert_eq!(eth.risk_profile().target_multiples, vec![2.0, 3.0]);
    }

    #[test]
    fn test_missing_field_without_default_is_fatal() {
        let toml = r#"
[runtime]
symbols = ["BTC/USDT"]

[symbols."BTC/USDT"]
atr_timeframe = "1d"
atr_length = 14
atr_multiplier = 2.0
strong_signal_threshold = 2.0
weak_signal_threshold = 1.0
"#;
        let err = AppConfig::from_toml(toml).unwrap_err();
        match err {
            ConfigError::MissingField { symbol, field } => {
                assert_eq!(symbol, "BTC/USDT");
                assert_eq!(field, "risk_percent");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let toml = SAMPLE.replace("risk_percent = 2.0", "risk_percent = 9.0").replace("mean_reversion = 0.3", "mean_reversion = 0.0");
        let err = AppConfig::from_toml(&toml).unwrap_err();
        let ConfigError::Invalid(problems) = err else {
            panic!("expected Invalid");
        };
        assert!(problems.iter().any(|p| p.contains("weights")));
        assert!(problems.iter().any(|p| p.contains("risk_percent 9")));
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let toml = SAMPLE.replace("preset = \"v2_3\"", "preset = \"v9\"");
        assert!(matches!(AppConfig::from_toml(&toml), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let exchange = ExchangeConfig {
            api_key: Some("abc123".to_string()),
            secret_key: Some("shh".to_string()),
            ..Default::default()
        };
        let shown = format!("{:?}", exchange);
        assert!(!shown.contains("abc123"));
        assert!(!shown.contains("shh"));
    }
}
