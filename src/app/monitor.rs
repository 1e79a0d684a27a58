use crate::api::MarketDataSource;
use crate::app::cycle::{build_decision_engine, call_timeout, with_timeout};
use crate::app::notify::SignalSink;
use crate::config::{AppConfig, SymbolConfig};
use crate::decision::DecisionEngine;
use crate::error::{ConfigError, ExchangeError};
use crate::indicators::IndicatorEngine;
use crate::models::{Position, PositionSide, Timeframe};
use crate::risk::{PositionRiskLimits, RiskLevel, TrailingStopTracker};
use crate::signals::{SignalThresholds, TimeframeScorer};
use crate::strategy::{ExitKind, MarketSnapshot};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MonitorReport {
    pub positions: usize,
    pub stop_advisories: usize,
    pub exit_advisories: usize,
    pub risk_alerts: usize,
    /// Positions held past the configured maximum
    pub long_held: usize,
}

type PositionKey = (String, PositionSide);

fn key(position: &Position) -> PositionKey {
    (position.symbol.clone(), position.side)
}

/// Watches open positions between analysis cycles
///
/// Emits trailing-stop and exit advisories, plus alerts when a position's
/// risk level worsens. Advisories are not repeated while nothing changes.
pub struct PositionMonitor {
    source: Arc<dyn MarketDataSource>,
    sink: Arc<dyn SignalSink>,
    indicators: IndicatorEngine,
    scorer: TimeframeScorer,
    decisions: DecisionEngine,
    symbols: HashMap<String, SymbolConfig>,
    limits: PositionRiskLimits,
    trailing: TrailingStopTracker,
    exits_sent: HashMap<PositionKey, HashSet<ExitKind>>,
    risk_levels: HashMap<PositionKey, RiskLevel>,
    first_seen: HashMap<PositionKey, DateTime<Utc>>,
    candle_limit: usize,
    call_timeout: Duration,
}

impl PositionMonitor {
    pub fn from_config(
        cfg: &AppConfig,
        source: Arc<dyn MarketDataSource>,
        sink: Arc<dyn SignalSink>,
    ) -> Result<Self, ConfigError> {
        let indicators = IndicatorEngine::new(cfg.strategy.preset.preset().indicators);
        let scorer = TimeframeScorer::new(cfg.strategy.scoring);
        let decisions = build_decision_engine(cfg, &scorer);
        let symbols = cfg
            .symbol_configs()?
            .into_iter()
            .map(|sc| (sc.symbol.clone(), sc))
            .collect();

        Ok(Self {
            source,
            sink,
            candle_limit: cfg.runtime.candle_limit.max(indicators.min_candles()),
            indicators,
            scorer,
            decisions,
            symbols,
            limits: cfg.risk.limits.clone(),
            trailing: TrailingStopTracker::new(),
            exits_sent: HashMap::new(),
            risk_levels: HashMap::new(),
            first_seen: HashMap::new(),
            call_timeout: call_timeout(cfg),
        })
    }

    pub async fn run_once(&mut self, now: DateTime<Utc>) -> Result<MonitorReport, ExchangeError> {
        let positions = with_timeout(self.call_timeout, self.source.get_open_positions()).await?;
        self.forget_closed(&positions);

        let mut report = MonitorReport {
            positions: positions.len(),
            ..Default::default()
        };
        if positions.is_empty() {
            tracing::debug!("No open positions");
            return Ok(report);
        }
        tracing::info!("👀 Monitoring {} position(s)", positions.len());

        for position in &positions {
            if let Err(e) = self.check_position(position, now, &mut report).await {
                tracing::warn!("{} monitor check skipped: {}", position.symbol, e);
            }
        }
        Ok(report)
    }

    fn forget_closed(&mut self, positions: &[Position]) {
        self.trailing.retain_open(positions);
        let open: HashSet<PositionKey> = positions.iter().map(key).collect();
        self.exits_sent.retain(|k, _| open.contains(k));
        self.risk_levels.retain(|k, _| open.contains(k));
        self.first_seen.retain(|k, _| open.contains(k));
    }

    async fn check_position(
        &mut self,
        position: &Position,
        now: DateTime<Utc>,
        report: &mut MonitorReport,
    ) -> Result<(), ExchangeError> {
        let price = position.mark_price;

        // The exchange does not report an open time; count from the first sighting
        let since = *self.first_seen.entry(key(position)).or_insert(now);
        let held = now - since;
        let risk = self.limits.assess_held(position, price, held);
        if self.limits.held_too_long(held) {
            report.long_held += 1;
        }
        let previous = self.risk_levels.insert(key(position), risk.level);
        for note in &risk.notes {
            tracing::info!("{} {}: {}", position.symbol, position.side, note);
        }
        if risk.needs_alert() && previous.map_or(true, |p| risk.level > p) {
            self.sink
                .alert(&format!(
                    "{} {} risk {} at {:+.2}%: {}",
                    position.symbol,
                    position.side,
                    risk.level,
                    risk.pnl_percent,
                    risk.notes.join("; ")
                ))
                .await;
            report.risk_alerts += 1;
        }

        // Positions opened outside the configured symbols only get risk checks
        let Some(symbol) = self.symbols.get(&position.symbol).cloned() else {
            return Ok(());
        };

        let h1 = with_timeout(
            self.call_timeout,
            self.source.fetch_candles(&symbol.symbol, Timeframe::H1, self.candle_limit),
        )
        .await?;
        let atr_candles = if symbol.atr_timeframe == Timeframe::H1 {
            h1.clone()
        } else {
            with_timeout(
                self.call_timeout,
                self.source.fetch_candles(
                    &symbol.symbol,
                    symbol.atr_timeframe,
                    self.candle_limit.max(symbol.atr_length + 2),
                ),
            )
            .await?
        };

        match IndicatorEngine::sizing_atr(&atr_candles, symbol.atr_length) {
            Ok(atr) => {
                if let Some(advisory) = self.trailing.update(position, price, atr, symbol.atr_multiplier, now) {
                    self.sink.publish_stop(&advisory).await;
                    report.stop_advisories += 1;
                }
            }
            Err(e) => tracing::warn!("{}: no ATR for trailing stop ({})", symbol.symbol, e),
        }

        let set = match self.indicators.compute(&h1) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!("{}: no 1h indicators for exit checks ({})", symbol.symbol, e);
                return Ok(());
            }
        };
        let thresholds: SignalThresholds = symbol.thresholds;
        let analysis = self.scorer.analyze(Timeframe::H1, set, &thresholds);
        let market = MarketSnapshot::new(symbol.symbol.as_str(), thresholds).with_analysis(Timeframe::H1, analysis);

        let advisories: Vec<_> = self
            .decisions
            .strategies()
            .filter_map(|s| s.should_exit_position(position, &market))
            .collect();
        for advisory in advisories {
            let sent = self.exits_sent.entry(key(position)).or_default();
            if sent.insert(advisory.kind) {
                self.sink.publish_exit(&advisory).await;
                report.exit_advisories += 1;
            }
        }

        Ok(())
    }
}
