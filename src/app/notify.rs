use crate::risk::{StopAdvisory, TradePlan};
use crate::strategy::ExitAdvisory;
use async_trait::async_trait;

/// Where signals go. Delivery failures are the sink's problem, not the caller's.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn publish_plan(&self, plan: &TradePlan);
    async fn publish_stop(&self, advisory: &StopAdvisory);
    async fn publish_exit(&self, advisory: &ExitAdvisory);
    async fn alert(&self, message: &str);
}

/// Writes every signal to the log
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl SignalSink for LogSink {
    async fn publish_plan(&self, plan: &TradePlan) {
        let targets = plan
            .targets
            .iter()
            .map(|t| format!("{:.1}R {:.4} (+${:.2})", t.r_multiple, t.price, t.profit_usd))
            .collect::<Vec<_>>()
            .join(", ");

        tracing::warn!(
            "📣 TRADE PLAN {} {}{}\n  Entry:     {:.4}\n  Stop:      {:.4} ({:.1} x ATR {:.4} on {} / {})\n  Size:      {:.6} (${:.2})\n  Risk:      ${:.2} ({:.2}%)\n  Targets:   {}\n  Confidence {:.3}: {}",
            plan.symbol,
            plan.direction,
            if plan.reversal { " (REVERSAL)" } else { "" },
            plan.entry_price,
            plan.stop_loss_price,
            plan.atr_multiplier,
            plan.atr_value,
            plan.atr_timeframe,
            plan.atr_length,
            plan.position_size_coin,
            plan.position_size_usd,
            plan.risk_amount_usd,
            plan.risk_percent,
            targets,
            plan.confidence,
            plan.decision_reason
        );

        match serde_json::to_string(plan) {
            Ok(json) => tracing::debug!(plan = %json, "trade plan payload"),
            Err(e) => tracing::debug!("Could not serialize plan {}: {}", plan.id, e),
        }
    }

    async fn publish_stop(&self, advisory: &StopAdvisory) {
        tracing::warn!(
            "🛡️  TRAILING STOP {} ({}): entry {:.4}, price {:.4}, new SL {:.4} locks {:+.2}%",
            advisory.symbol,
            advisory.side,
            advisory.entry_price,
            advisory.current_price,
            advisory.new_stop_loss,
            advisory.locked_percent()
        );
    }

    async fn publish_exit(&self, advisory: &ExitAdvisory) {
        tracing::warn!(
            "🚪 EXIT ADVISORY {} [{:?}] by {} conf={:.2}: {}",
            advisory.symbol,
            advisory.kind,
            advisory.strategy,
            advisory.confidence,
            advisory.reason
        );
    }

    async fn alert(&self, message: &str) {
        tracing::error!("🚨 ALERT: {}", message);
    }
}
