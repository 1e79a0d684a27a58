use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use trendbot::api::MarketDataSource;
use trendbot::app::{Analyzer, PositionMonitor, SchedulerState, SignalSink};
use trendbot::config::AppConfig;
use trendbot::indicators::IndicatorEngine;
use trendbot::risk::{StopAdvisory, TradePlan};
use trendbot::strategy::{ExitAdvisory, ExitKind, StrategyKind};
use trendbot::{AccountBalance, Action, Candle, ExchangeError, Position, PositionSide, Timeframe};

const CONFIG: &str = r#"
[runtime]
symbols = ["BTC/USDT", "ETH/USDT"]
candle_limit = 300
alert_cooldown_minutes = 60

[strategy]
preset = "v2_1"

[symbols.DEFAULT]
atr_timeframe = "1d"
atr_length = 14
atr_multiplier = 2.0
risk_percent = 2.0
strong_signal_threshold = 2.0
weak_signal_threshold = 1.0
"#;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct InMemorySource {
    candles: HashMap<(String, Timeframe), Vec<Candle>>,
    positions: Mutex<Vec<Position>>,
    balance: AccountBalance,
    fail_candles: bool,
}

#[async_trait]
impl MarketDataSource for InMemorySource {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, ExchangeError> {
        if self.fail_candles {
            return Err(ExchangeError::Status {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        let series = self
            .candles
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .unwrap_or_default();
        let skip = series.len().saturating_sub(limit);
        Ok(series.into_iter().skip(skip).collect())
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, ExchangeError> {
        Ok(self.balance)
    }
}

#[derive(Default)]
struct RecordingSink {
    plans: Mutex<Vec<TradePlan>>,
    stops: Mutex<Vec<StopAdvisory>>,
    exits: Mutex<Vec<ExitAdvisory>>,
    alerts: Mutex<Vec<String>>,
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn publish_plan(&self, plan: &TradePlan) {
        self.plans.lock().unwrap().push(plan.clone());
    }
    async fn publish_stop(&self, advisory: &StopAdvisory) {
        self.stops.lock().unwrap().push(advisory.clone());
    }
    async fn publish_exit(&self, advisory: &ExitAdvisory) {
        self.exits.lock().unwrap().push(advisory.clone());
    }
    async fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 1, 9, 1, 0).unwrap()
}

/// Accelerating uptrend: every indicator votes bullish
fn uptrend(timeframe: Timeframe, count: usize) -> Vec<Candle> {
    let step = Duration::seconds(timeframe.duration_secs());
    let start = now() - step * count as i32;
    let mut prev = 100.0;
    (0..count)
        .map(|i| {
            let close = 100.0 + 0.01 * (i * i) as f64;
            let candle = Candle {
                open_time: start + step * i as i32,
                open: prev,
                high: close * 1.01,
                low: prev.min(close) * 0.99,
                close,
                volume: 1000.0,
            };
            prev = close;
            candle
        })
        .collect()
}

fn source_with_uptrend(symbols: &[&str], count: usize) -> InMemorySource {
    let mut source = InMemorySource {
        balance: AccountBalance {
            wallet: 10_000.0,
            available: 10_000.0,
            unrealized_pnl: 0.0,
        },
        ..Default::default()
    };
    for symbol in symbols {
        for tf in [Timeframe::D1, Timeframe::H4, Timeframe::H1] {
            source.candles.insert((symbol.to_string(), tf), uptrend(tf, count));
        }
    }
    source
}

impl InMemorySource {
    fn hold(&self, position: Position) {
        *self.positions.lock().unwrap() = vec![position];
    }

    fn last_close(&self, symbol: &str) -> f64 {
        self.candles[&(symbol.to_string(), Timeframe::H1)].last().unwrap().close
    }
}

fn analyzer(source: InMemorySource, sink: Arc<RecordingSink>) -> Analyzer {
    let cfg = AppConfig::from_toml(CONFIG).unwrap();
    Analyzer::from_config(&cfg, Arc::new(source), sink).unwrap()
}

// ============================================================================
// Analysis cycle
// ============================================================================

#[tokio::test]
async fn test_uptrend_produces_one_long_plan_per_symbol() {
    let _ = tracing_subscriber::fmt::try_init();

    let sink = Arc::new(RecordingSink::default());
    let analyzer = analyzer(source_with_uptrend(&["BTC/USDT", "ETH/USDT"], 300), sink.clone());
    let mut state = SchedulerState::new(now() - Duration::days(1), 60);

    let report = analyzer.run_cycle(&mut state, now()).await;

    assert_eq!(report.plans.len(), 2);
    assert!(report.skipped.is_empty());
    assert!(!report.alert_sent);

    let plans = sink.plans.lock().unwrap();
    assert_eq!(plans.len(), 2);
    for plan in plans.iter() {
        assert_eq!(plan.direction, PositionSide::Long);
        assert_eq!(plan.strategy, Some(StrategyKind::TrendFollowing));
        assert!(plan.confidence >= 0.95);
        assert!(plan.stop_loss_price < plan.entry_price);
        assert!((plan.risk_amount_usd - 200.0).abs() < 1e-9);
        assert_eq!(plan.atr_timeframe, Timeframe::D1);
        assert_eq!(plan.atr_length, 14);
        assert_eq!(plan.targets.len(), 2);
        assert!(plan.decision_reason.contains("TrendFollowing"));
        assert!(!plan.reversal);
    }

    // Plans reset the emergency idle clock
    assert_eq!(state.last_plan_at("BTC/USDT"), Some(now()));
    assert_eq!(state.consecutive_failed_cycles, 0);
}

#[tokio::test]
async fn test_agreeing_position_blocks_new_plan() {
    let source = source_with_uptrend(&["BTC/USDT", "ETH/USDT"], 300);
    source.hold(Position {
        symbol: "BTC/USDT".to_string(),
        side: PositionSide::Long,
        entry_price: 500.0,
        size: 1.0,
        mark_price: 990.0,
        unrealized_pnl: 490.0,
    });

    let sink = Arc::new(RecordingSink::default());
    let analyzer = analyzer(source, sink.clone());
    let mut state = SchedulerState::new(now(), 60);

    let report = analyzer.run_cycle(&mut state, now()).await;

    assert_eq!(report.plans.len(), 1);
    assert_eq!(report.plans[0].symbol, "ETH/USDT");
    let btc = report.holds.iter().find(|d| d.symbol == "BTC/USDT").unwrap();
    assert_eq!(btc.action, Action::Hold);
}

#[tokio::test]
async fn test_opposing_position_yields_reversal_plan() {
    let source = source_with_uptrend(&["BTC/USDT", "ETH/USDT"], 300);
    let price = source.last_close("BTC/USDT");
    source.hold(Position {
        symbol: "BTC/USDT".to_string(),
        side: PositionSide::Short,
        entry_price: price * 0.98,
        size: 1.0,
        mark_price: price,
        unrealized_pnl: -price * 0.02,
    });

    let sink = Arc::new(RecordingSink::default());
    let analyzer = analyzer(source, sink.clone());
    let mut state = SchedulerState::new(now(), 60);

    let report = analyzer.run_cycle(&mut state, now()).await;
    assert_eq!(report.plans.len(), 2);

    let btc = report.plans.iter().find(|p| p.symbol == "BTC/USDT").unwrap();
    assert!(btc.reversal);
    assert_eq!(btc.direction, PositionSide::Long);
    assert_eq!(btc.strategy, Some(StrategyKind::TrendFollowing));
    assert!(btc.confidence >= 0.6);
    assert!(btc.decision_reason.starts_with("close SHORT then open LONG"));

    // Symbol profile (2%, 2 x ATR, 2R/3R), not the mean-reversion one
    assert!((btc.risk_amount_usd - 200.0).abs() < 1e-9);
    assert_eq!(btc.atr_multiplier, 2.0);
    let multiples: Vec<f64> = btc.targets.iter().map(|t| t.r_multiple).collect();
    assert_eq!(multiples, vec![2.0, 3.0]);

    let eth = report.plans.iter().find(|p| p.symbol == "ETH/USDT").unwrap();
    assert!(!eth.reversal);
}

#[tokio::test]
async fn test_insufficient_history_is_skipped_quietly() {
    let sink = Arc::new(RecordingSink::default());
    let analyzer = analyzer(source_with_uptrend(&["BTC/USDT", "ETH/USDT"], 30), sink.clone());
    let mut state = SchedulerState::new(now(), 60);

    let report = analyzer.run_cycle(&mut state, now()).await;

    // No timeframe has enough candles: every strategy holds
    assert!(report.plans.is_empty());
    assert_eq!(report.holds.len(), 2);
    assert_eq!(report.exchange_failures, 0);
    assert!(sink.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_total_exchange_failure_sends_one_alert_per_cooldown() {
    let mut source = source_with_uptrend(&["BTC/USDT", "ETH/USDT"], 300);
    source.fail_candles = true;

    let sink = Arc::new(RecordingSink::default());
    let analyzer = analyzer(source, sink.clone());
    let mut state = SchedulerState::new(now(), 60);

    let first = analyzer.run_cycle(&mut state, now()).await;
    assert!(first.all_failed());
    assert!(first.alert_sent);
    assert_eq!(first.skipped.len(), 2);

    // Still inside the 60 minute cooldown
    let second = analyzer.run_cycle(&mut state, now() + Duration::minutes(30)).await;
    assert!(!second.alert_sent);

    let third = analyzer.run_cycle(&mut state, now() + Duration::minutes(61)).await;
    assert!(third.alert_sent);

    let alerts = sink.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].contains("BTC/USDT"));
    assert!(alerts[0].contains("ETH/USDT"));
    assert_eq!(state.consecutive_failed_cycles, 3);
}

// ============================================================================
// Position monitor
// ============================================================================

#[tokio::test]
async fn test_monitor_trails_profitable_position_once() {
    let source = source_with_uptrend(&["BTC/USDT"], 300);
    let last_close = source.last_close("BTC/USDT");
    let daily_atr =
        IndicatorEngine::sizing_atr(&source.candles[&("BTC/USDT".to_string(), Timeframe::D1)], 14).unwrap();
    source.hold(Position {
        symbol: "BTC/USDT".to_string(),
        side: PositionSide::Long,
        entry_price: 300.0,
        size: 1.0,
        mark_price: last_close,
        unrealized_pnl: last_close - 300.0,
    });

    let cfg = AppConfig::from_toml(CONFIG).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let mut monitor = PositionMonitor::from_config(&cfg, Arc::new(source), sink.clone()).unwrap();

    let report = monitor.run_once(now()).await.unwrap();
    assert_eq!(report.positions, 1);
    assert_eq!(report.stop_advisories, 1);
    assert_eq!(report.risk_alerts, 0);

    {
        let stops = sink.stops.lock().unwrap();
        assert!(stops[0].new_stop_loss > 300.0);
        assert!(stops[0].new_stop_loss < last_close);
        // Same full-history ATR the analysis cycle sizes with
        assert!((stops[0].atr_value - daily_atr).abs() < 1e-9);
    }
    // Far past the reversal take-profit
    assert!(sink
        .exits
        .lock()
        .unwrap()
        .iter()
        .any(|e| e.kind == ExitKind::TakeProfit && e.reverse_into.is_none()));

    // Same prices again: nothing new to say
    let again = monitor.run_once(now() + Duration::seconds(15)).await.unwrap();
    assert_eq!(again.stop_advisories, 0);
    assert_eq!(again.exit_advisories, 0);
}

#[tokio::test]
async fn test_monitor_alerts_on_losing_position() {
    let source = source_with_uptrend(&["BTC/USDT"], 300);
    source.hold(Position {
        symbol: "DOGE/USDT".to_string(),
        side: PositionSide::Short,
        entry_price: 0.10,
        size: 1000.0,
        mark_price: 0.106,
        unrealized_pnl: -6.0,
    });

    let cfg = AppConfig::from_toml(CONFIG).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let mut monitor = PositionMonitor::from_config(&cfg, Arc::new(source), sink.clone()).unwrap();

    let report = monitor.run_once(now()).await.unwrap();
    assert_eq!(report.risk_alerts, 1);
    assert!(sink.alerts.lock().unwrap()[0].contains("HIGH"));

    // Unchanged level is not repeated
    let again = monitor.run_once(now()).await.unwrap();
    assert_eq!(again.risk_alerts, 0);
}

#[tokio::test]
async fn test_monitor_reversed_position_gets_fresh_advisories() {
    let source = Arc::new(source_with_uptrend(&["BTC/USDT"], 300));
    let price = source.last_close("BTC/USDT");
    source.hold(Position {
        symbol: "BTC/USDT".to_string(),
        side: PositionSide::Long,
        entry_price: price / 1.04,
        size: 1.0,
        mark_price: price,
        unrealized_pnl: price - price / 1.04,
    });

    let cfg = AppConfig::from_toml(CONFIG).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let mut monitor = PositionMonitor::from_config(&cfg, source.clone(), sink.clone()).unwrap();
    monitor.run_once(now()).await.unwrap();

    // Long closed and a short opened on the same symbol, also up 4%
    source.hold(Position {
        symbol: "BTC/USDT".to_string(),
        side: PositionSide::Short,
        entry_price: price / 0.96,
        size: 1.0,
        mark_price: price,
        unrealized_pnl: price / 0.96 - price,
    });
    monitor.run_once(now() + Duration::seconds(15)).await.unwrap();

    let take_profits = sink
        .exits
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind == ExitKind::TakeProfit)
        .count();
    assert_eq!(take_profits, 2);
}

#[tokio::test]
async fn test_monitor_counts_positions_held_too_long() {
    let source = source_with_uptrend(&["BTC/USDT"], 300);
    source.hold(Position {
        symbol: "DOGE/USDT".to_string(),
        side: PositionSide::Long,
        entry_price: 0.10,
        size: 1000.0,
        mark_price: 0.10,
        unrealized_pnl: 0.0,
    });

    let cfg = AppConfig::from_toml(CONFIG).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let mut monitor = PositionMonitor::from_config(&cfg, Arc::new(source), sink.clone()).unwrap();

    assert_eq!(monitor.run_once(now()).await.unwrap().long_held, 0);
    assert_eq!(monitor.run_once(now() + Duration::hours(72)).await.unwrap().long_held, 0);
    assert_eq!(monitor.run_once(now() + Duration::hours(73)).await.unwrap().long_held, 1);

    // A note, not an alert
    assert!(sink.alerts.lock().unwrap().is_empty());
}
