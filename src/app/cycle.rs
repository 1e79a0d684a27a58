use crate::api::MarketDataSource;
use crate::app::notify::SignalSink;
use crate::app::scheduler::SchedulerState;
use crate::config::{AppConfig, SymbolConfig};
use crate::decision::{Decision, DecisionEngine};
use crate::error::{ConfigError, ExchangeError, IndicatorError, SizingError};
use crate::indicators::IndicatorEngine;
use crate::models::{AccountBalance, Candle, Position, Timeframe};
use crate::risk::{AtrReading, PositionSizer, RiskProfile, TradePlan};
use crate::signals::TimeframeScorer;
use crate::strategy::{MarketSnapshot, MeanReversionStrategy, StrategyKind, TrendFollowingStrategy};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Outer deadline per exchange call, in request timeouts (covers client retries)
const CALL_TIMEOUT_FACTOR: u32 = 4;

/// Why a symbol produced nothing this cycle
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error(transparent)]
    Sizing(#[from] SizingError),
}

#[derive(Debug)]
pub enum SymbolOutcome {
    Plan(TradePlan),
    Hold(Decision),
}

/// What one analysis cycle did
#[derive(Debug, Default)]
pub struct CycleReport {
    pub symbols: usize,
    pub plans: Vec<TradePlan>,
    pub holds: Vec<Decision>,
    pub skipped: Vec<(String, String)>,
    pub exchange_failures: usize,
    pub account_error: Option<String>,
    pub alert_sent: bool,
}

impl CycleReport {
    pub fn all_failed(&self) -> bool {
        self.account_error.is_some() || (self.symbols > 0 && self.exchange_failures == self.symbols)
    }
}

/// Both strategies from the configured preset, minus any disabled ones
pub fn build_decision_engine(cfg: &AppConfig, scorer: &TimeframeScorer) -> DecisionEngine {
    let preset = cfg.strategy.preset.preset();
    let mut decisions = DecisionEngine::new(cfg.strategy.decision)
        .with_strategy(Box::new(TrendFollowingStrategy::new(preset, scorer.max_score())))
        .with_strategy(Box::new(MeanReversionStrategy::new(cfg.strategy.mean_reversion)));
    for kind in &cfg.strategy.disabled {
        decisions.set_enabled(&kind.to_string(), false);
    }
    decisions
}

pub(crate) fn call_timeout(cfg: &AppConfig) -> Duration {
    Duration::from_secs(cfg.runtime.request_timeout_secs) * CALL_TIMEOUT_FACTOR
}

pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, ExchangeError>>,
) -> Result<T, ExchangeError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ExchangeError::Timeout(limit.as_secs()))?
}

/// Runs the hourly pipeline: fetch, analyze, decide, size, publish
pub struct Analyzer {
    source: Arc<dyn MarketDataSource>,
    sink: Arc<dyn SignalSink>,
    indicators: IndicatorEngine,
    scorer: TimeframeScorer,
    decisions: DecisionEngine,
    sizer: PositionSizer,
    symbols: Vec<SymbolConfig>,
    reversal_profile: RiskProfile,
    candle_limit: usize,
    call_timeout: Duration,
}

impl Analyzer {
    pub fn from_config(
        cfg: &AppConfig,
        source: Arc<dyn MarketDataSource>,
        sink: Arc<dyn SignalSink>,
    ) -> Result<Self, ConfigError> {
        let preset = cfg.strategy.preset.preset();
        let indicators = IndicatorEngine::new(preset.indicators);
        let scorer = TimeframeScorer::new(cfg.strategy.scoring);

        let decisions = build_decision_engine(cfg, &scorer);

        Ok(Self {
            source,
            sink,
            candle_limit: cfg.runtime.candle_limit.max(indicators.min_candles()),
            indicators,
            scorer,
            decisions,
            sizer: PositionSizer::new(),
            symbols: cfg.symbol_configs()?,
            reversal_profile: cfg.risk.reversal.clone(),
            call_timeout: call_timeout(cfg),
        })
    }

    pub fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    pub fn symbols(&self) -> &[SymbolConfig] {
        &self.symbols
    }

    async fn call<T>(&self, fut: impl Future<Output = Result<T, ExchangeError>>) -> Result<T, ExchangeError> {
        with_timeout(self.call_timeout, fut).await
    }

    pub async fn run_cycle(&self, state: &mut SchedulerState, now: DateTime<Utc>) -> CycleReport {
        tracing::info!("🔎 [ANALYSIS] Cycle at {} for {} symbols", now.format("%Y-%m-%d %H:%M"), self.symbols.len());

        let mut report = CycleReport {
            symbols: self.symbols.len(),
            ..Default::default()
        };

        let snapshot = async {
            let balance = self.call(self.source.get_account_balance()).await?;
            let positions = self.call(self.source.get_open_positions()).await?;
            Ok::<_, ExchangeError>((balance, positions))
        };
        let (balance, positions) = match snapshot.await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Account snapshot failed: {}", e);
                report.account_error = Some(e.to_string());
                self.finish(state, now, &mut report, format!("account snapshot failed: {e}")).await;
                return report;
            }
        };
        tracing::info!(
            "💰 Balance: wallet ${:.2}, available ${:.2}, {} open position(s)",
            balance.wallet,
            balance.available,
            positions.len()
        );

        for symbol in &self.symbols {
            match self.analyze_symbol(symbol, &balance, &positions, state, now).await {
                Ok(SymbolOutcome::Plan(plan)) => {
                    self.sink.publish_plan(&plan).await;
                    state.record_plan(&plan.symbol, now);
                    report.plans.push(plan);
                }
                Ok(SymbolOutcome::Hold(decision)) => {
                    tracing::info!("⏸️  {} HOLD ({:.2}): {}", decision.symbol, decision.confidence, decision.reason);
                    report.holds.push(decision);
                }
                Err(e) => {
                    match &e {
                        SymbolError::Exchange(_) => {
                            report.exchange_failures += 1;
                            tracing::error!("❌ {} skipped: {}", symbol.symbol, e);
                        }
                        SymbolError::Indicator(_) => tracing::warn!("⚠️  {} skipped: {}", symbol.symbol, e),
                        SymbolError::Sizing(_) => tracing::warn!("⚠️  {} plan rejected: {}", symbol.symbol, e),
                    }
                    report.skipped.push((symbol.symbol.clone(), e.to_string()));
                }
            }
        }

        let summary = report
            .skipped
            .iter()
            .map(|(s, e)| format!("{s}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.finish(state, now, &mut report, format!("every symbol failed this cycle: {summary}")).await;

        tracing::info!(
            "✅ Cycle done: {} plan(s), {} hold(s), {} skipped",
            report.plans.len(),
            report.holds.len(),
            report.skipped.len()
        );
        report
    }

    /// Records the cycle and sends one rate-limited alert if nothing could be analyzed
    async fn finish(&self, state: &mut SchedulerState, now: DateTime<Utc>, report: &mut CycleReport, message: String) {
        let failed = report.all_failed();
        state.record_cycle(now, failed);
        if !failed {
            return;
        }
        if state.try_alert(now) {
            let message = format!("{} (failed cycles in a row: {})", message, state.consecutive_failed_cycles);
            self.sink.alert(&message).await;
            report.alert_sent = true;
        } else {
            tracing::warn!("Alert suppressed by cooldown: {}", message);
        }
    }

    async fn analyze_symbol(
        &self,
        symbol: &SymbolConfig,
        balance: &AccountBalance,
        positions: &[Position],
        state: &SchedulerState,
        now: DateTime<Utc>,
    ) -> Result<SymbolOutcome, SymbolError> {
        let name = symbol.symbol.as_str();
        let mut candles: BTreeMap<Timeframe, Vec<Candle>> = BTreeMap::new();
        let mut market = MarketSnapshot::new(name, symbol.thresholds);
        market.idle_days = state.idle_days(name, now);

        for timeframe in self.decisions.required_timeframes() {
            let series = self
                .call(self.source.fetch_candles(name, timeframe, self.candle_limit))
                .await?;
            match self.indicators.compute(&series) {
                Ok(set) => {
                    let analysis = self.scorer.analyze(timeframe, set, &symbol.thresholds);
                    market = market.with_analysis(timeframe, analysis);
                }
                Err(e) => tracing::warn!("{} {}: {}, timeframe skipped", name, timeframe, e),
            }
            candles.insert(timeframe, series);
        }

        let position = positions.iter().find(|p| p.symbol == name);
        let decision = self.decisions.decide(&market, position, now);

        if !decision.is_actionable() {
            return Ok(SymbolOutcome::Hold(decision));
        }
        if position.is_some() && !decision.is_reversal() {
            return Ok(SymbolOutcome::Hold(decision));
        }

        // Sizing ATR may use a timeframe the strategies did not need
        if !candles.contains_key(&symbol.atr_timeframe) {
            let limit = self.candle_limit.max(symbol.atr_length + 2);
            let series = self
                .call(self.source.fetch_candles(name, symbol.atr_timeframe, limit))
                .await?;
            candles.insert(symbol.atr_timeframe, series);
        }
        let atr_value = match candles.get(&symbol.atr_timeframe) {
            Some(series) => IndicatorEngine::sizing_atr(series, symbol.atr_length)?,
            None => return Err(IndicatorError::InsufficientData { needed: symbol.atr_length + 2, got: 0 }.into()),
        };

        let entry_price = candles
            .get(&Timeframe::H1)
            .or_else(|| candles.values().next())
            .and_then(|series| series.last())
            .map(|c| c.close)
            .ok_or(SizingError::InvalidPrice(0.0))?;

        let profile = match decision.lead_strategy {
            Some(StrategyKind::MeanReversion) => self.reversal_profile.clone(),
            _ => symbol.risk_profile(),
        };
        let atr = AtrReading {
            value: atr_value,
            timeframe: symbol.atr_timeframe,
            length: symbol.atr_length,
        };

        let plan = self.sizer.size(&decision, entry_price, atr, balance.available, &profile)?;
        Ok(SymbolOutcome::Plan(plan))
    }
}
