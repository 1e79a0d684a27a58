use crate::models::{Action, Position, PositionSide, Timeframe};
use crate::strategy::{MarketSnapshot, Strategy, StrategyKind, StrategyRecommendation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Arbitration weight per strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyWeights {
    pub trend_following: f64,
    pub mean_reversion: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            trend_following: 0.7,
            mean_reversion: 0.3,
        }
    }
}

impl StrategyWeights {
    pub fn weight(&self, kind: StrategyKind) -> f64 {
        match kind {
            StrategyKind::TrendFollowing => self.trend_following,
            StrategyKind::MeanReversion => self.mean_reversion,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecisionConfig {
    /// Minimum weighted confidence to act on a multi-strategy vote
    pub min_confidence_threshold: f64,
    /// Minimum confidence for a signal to reverse an open position
    pub reversal_confidence_threshold: f64,
    pub weights: StrategyWeights,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_confidence_threshold: 0.6,
            reversal_confidence_threshold: 0.6,
            weights: StrategyWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReversalInfo {
    pub current_side: PositionSide,
    /// Human-readable instruction, e.g. "close LONG then open SHORT"
    pub action_required: String,
}

/// Arbitrated outcome for one symbol in one cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: Uuid,
    pub symbol: String,
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
    /// Strategies that voted for `action`
    pub strategies: Vec<StrategyKind>,
    /// Strategy whose recommendation carried the decision
    pub lead_strategy: Option<StrategyKind>,
    pub reversal: Option<ReversalInfo>,
    pub timestamp: DateTime<Utc>,
}

/// Same symbol, action and timestamp always give the same id
fn decision_id(symbol: &str, action: Action, timestamp: DateTime<Utc>) -> Uuid {
    let name = format!("{}|{}|{}", symbol, action, timestamp.to_rfc3339());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

impl Decision {
    fn hold(symbol: &str, reason: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: decision_id(symbol, Action::Hold, timestamp),
            symbol: symbol.to_string(),
            action: Action::Hold,
            confidence: 0.0,
            reason: reason.into(),
            strategies: Vec::new(),
            lead_strategy: None,
            reversal: None,
            timestamp,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action.is_entry()
    }

    pub fn is_reversal(&self) -> bool {
        self.reversal.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub name: String,
    pub kind: StrategyKind,
    pub enabled: bool,
    pub weight: f64,
}

struct Registered {
    strategy: Box<dyn Strategy>,
    enabled: bool,
}

/// Runs every enabled strategy for a symbol and resolves their votes.
pub struct DecisionEngine {
    config: DecisionConfig,
    strategies: Vec<Registered>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        tracing::info!("Strategy loaded: {}", strategy.name());
        self.strategies.push(Registered {
            strategy,
            enabled: true,
        });
        self
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Returns false when no strategy has that name
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.strategies.iter_mut().find(|r| r.strategy.name() == name) {
            Some(r) => {
                r.enabled = enabled;
                tracing::info!(
                    "Strategy {} {}",
                    name,
                    if enabled { "enabled" } else { "disabled" }
                );
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> Vec<StrategyStatus> {
        self.strategies
            .iter()
            .map(|r| StrategyStatus {
                name: r.strategy.name().to_string(),
                kind: r.strategy.kind(),
                enabled: r.enabled,
                weight: self.config.weights.weight(r.strategy.kind()),
            })
            .collect()
    }

    /// Union of timeframes the enabled strategies read, coarsest first
    pub fn required_timeframes(&self) -> Vec<Timeframe> {
        let mut tfs: Vec<Timeframe> = self
            .strategies
            .iter()
            .filter(|r| r.enabled)
            .flat_map(|r| r.strategy.required_timeframes().iter().copied())
            .collect();
        tfs.sort_by(|a, b| b.cmp(a));
        tfs.dedup();
        tfs
    }

    /// Enabled strategies, for exit checks outside the decision path
    pub fn strategies(&self) -> impl Iterator<Item = &dyn Strategy> {
        self.strategies
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.strategy.as_ref())
    }

    pub fn decide(
        &self,
        market: &MarketSnapshot,
        position: Option<&Position>,
        timestamp: DateTime<Utc>,
    ) -> Decision {
        let symbol = market.symbol.as_str();

        let mut holds = Vec::new();
        let mut recs = Vec::new();
        for r in self.strategies.iter().filter(|r| r.enabled) {
            if position.is_some() && r.strategy.kind() == StrategyKind::MeanReversion {
                tracing::debug!("[{}] skipping {}: position already open", symbol, r.strategy.name());
                continue;
            }
            let rec = r.strategy.evaluate(market, position);
            tracing::debug!(
                "[{}] {} suggests {} ({:.3}): {}",
                symbol,
                r.strategy.name(),
                rec.action,
                rec.confidence,
                rec.reason
            );
            if rec.is_hold() {
                holds.push(format!("{}: {}", rec.strategy, rec.reason));
            } else {
                recs.push(rec);
            }
        }

        if let Some(position) = position {
            return self.decide_with_position(symbol, position, &recs, timestamp);
        }

        match recs.len() {
            0 => {
                let reason = if holds.is_empty() {
                    "no strategy produced a trade signal".to_string()
                } else {
                    holds.join("; ")
                };
                Decision::hold(symbol, reason, timestamp)
            }
            1 => {
                let rec = &recs[0];
                Decision {
                    id: decision_id(symbol, rec.action, timestamp),
                    symbol: symbol.to_string(),
                    action: rec.action,
                    confidence: round3(rec.confidence),
                    reason: format!("{}: {}", rec.strategy, rec.reason),
                    strategies: vec![rec.strategy],
                    lead_strategy: Some(rec.strategy),
                    reversal: None,
                    timestamp,
                }
            }
            _ => self.weighted_vote(symbol, &recs, timestamp),
        }
    }

    fn decide_with_position(
        &self,
        symbol: &str,
        position: &Position,
        recs: &[StrategyRecommendation],
        timestamp: DateTime<Utc>,
    ) -> Decision {
        let threshold = self.config.reversal_confidence_threshold;
        let best = recs
            .iter()
            .filter(|r| r.action.opposes(position.side) && r.confidence >= threshold)
            .max_by(|a, b| {
                let wa = a.confidence * self.config.weights.weight(a.strategy);
                let wb = b.confidence * self.config.weights.weight(b.strategy);
                wa.total_cmp(&wb)
            });

        match best {
            Some(rec) => {
                let new_side = position.side.opposite();
                tracing::warn!(
                    "🔄 [{}] reversal: holding {} vs new {} ({:.3})",
                    symbol,
                    position.side,
                    rec.action,
                    rec.confidence
                );
                let action_required = format!("close {} then open {}", position.side, new_side);
                Decision {
                    id: decision_id(symbol, rec.action, timestamp),
                    symbol: symbol.to_string(),
                    action: rec.action,
                    confidence: round3(rec.confidence),
                    reason: format!("{}: {}: {}", action_required, rec.strategy, rec.reason),
                    strategies: vec![rec.strategy],
                    lead_strategy: Some(rec.strategy),
                    reversal: Some(ReversalInfo {
                        current_side: position.side,
                        action_required,
                    }),
                    timestamp,
                }
            }
            None => Decision::hold(
                symbol,
                format!("holding {} position, no qualifying reversal signal", position.side),
                timestamp,
            ),
        }
    }

    /// Per-action weighted average Σ(w·c)/Σw; the best action must clear the minimum
    fn weighted_vote(&self, symbol: &str, recs: &[StrategyRecommendation], timestamp: DateTime<Utc>) -> Decision {
        let mut groups: Vec<(Action, f64, f64, Vec<&StrategyRecommendation>)> = Vec::new();
        for rec in recs {
            let w = self.config.weights.weight(rec.strategy);
            match groups.iter_mut().find(|g| g.0 == rec.action) {
                Some(g) => {
                    g.1 += w * rec.confidence;
                    g.2 += w;
                    g.3.push(rec);
                }
                None => groups.push((rec.action, w * rec.confidence, w, vec![rec])),
            }
        }

        let mut scored: Vec<(Action, f64, Vec<&StrategyRecommendation>)> = groups
            .into_iter()
            .filter(|g| g.2 > 0.0)
            .map(|(action, wc, w, members)| (action, wc / w, members))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let summary = scored
            .iter()
            .map(|(action, avg, _)| format!("{} {:.3}", action, avg))
            .collect::<Vec<_>>()
            .join(" vs ");

        let (action, avg, members) = match scored.first() {
            Some(best) => best,
            None => return Decision::hold(symbol, "no weighted strategy votes", timestamp),
        };

        // Averages carry float noise; compare at the precision confidence is reported
        if scored.get(1).is_some_and(|second| round3(second.1) == round3(*avg)) {
            return Decision::hold(symbol, format!("conflicting signals tied: {}", summary), timestamp);
        }

        if *avg < self.config.min_confidence_threshold {
            return Decision::hold(
                symbol,
                format!(
                    "weighted confidence {:.3} below {:.2} ({})",
                    avg, self.config.min_confidence_threshold, summary
                ),
                timestamp,
            );
        }

        let lead = members
            .iter()
            .max_by(|a, b| {
                let wa = a.confidence * self.config.weights.weight(a.strategy);
                let wb = b.confidence * self.config.weights.weight(b.strategy);
                wa.total_cmp(&wb)
            })
            .copied();
        let detail = members
            .iter()
            .map(|r| format!("{}: {}", r.strategy, r.reason))
            .collect::<Vec<_>>()
            .join("; ");

        Decision {
            id: decision_id(symbol, *action, timestamp),
            symbol: symbol.to_string(),
            action: *action,
            confidence: round3(*avg),
            reason: format!("weighted vote {} | {}", summary, detail),
            strategies: members.iter().map(|r| r.strategy).collect(),
            lead_strategy: lead.map(|r| r.strategy),
            reversal: None,
            timestamp,
        }
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
