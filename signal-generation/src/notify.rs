// Signal Notification
// Alert formatting and the notifier interface

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::signals::TradeSignal;

/// Best-effort delivery of an emitted signal
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, signal: &TradeSignal) -> Result<()>;
}

/// A signal rendered as a headline plus threaded follow-ups (Markdown)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertThread {
    pub headline: String,
    pub anomaly: String,
    pub confirmation: String,
    pub catalyst: Option<String>,
    pub risk: String,
}

impl AlertThread {
    pub fn from_signal(signal: &TradeSignal) -> Self {
        let plan = &signal.plan;

        let headline = format!(
            "🚨 *{}* | Score: *{}/100*\n*LONG* | Entry: `${:.2}` | SL: `${:.2}` | TP: `${:.2}` | R/R: 1:{}",
            signal.asset_id(),
            signal.score(),
            plan.entry_price,
            plan.stop_price,
            plan.take_profit_price,
            plan.reward_risk_ratio
        );

        let anomaly = format!(
            "⛏️ *Anomaly*: {} {:+.2}% against {} red assets ({})",
            signal.asset_id(),
            signal.candidate.change_pct,
            signal.red_assets.len(),
            signal.red_assets.join(", ")
        );

        let confirmation = format!("🔍 *Confirmation*: {}", signal.confidence.reasons.join("; "));

        let catalyst = signal
            .article_count
            .filter(|count| *count > 0)
            .map(|count| format!("💡 *Catalyst*: {} recent news articles", count));

        let risk = format!(
            "⚔️ *Risk*: max {:.1}% equity, max loss `${:.2}` at SL, size {:.6}",
            plan.risk_pct, plan.risk_amount, plan.size
        );

        Self {
            headline,
            anomaly,
            confirmation,
            catalyst,
            risk,
        }
    }

    /// Follow-up messages in send order
    pub fn replies(&self) -> Vec<&str> {
        let mut replies = vec![self.anomaly.as_str(), self.confirmation.as_str()];
        if let Some(catalyst) = &self.catalyst {
            replies.push(catalyst.as_str());
        }
        replies.push(self.risk.as_str());
        replies
    }
}

/// Writes each signal to the log as a structured JSON line
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, signal: &TradeSignal) -> Result<()> {
        let payload = serde_json::json!({
            "timestamp": signal.created_at.to_rfc3339(),
            "type": "trade_signal",
            "data": signal,
        });
        info!(signal_id = %signal.id, asset = %signal.asset_id(), "{}", payload);
        Ok(())
    }
}
