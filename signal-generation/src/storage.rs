// Signal Storage Interface
// Persistence for price checks, verdicts and emitted signals

use super::anomaly::VerdictSummary;
use super::reconcile::ConsensusResult;
use super::signals::TradeSignal;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything the pipeline reports to the store during a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SignalEvent {
    PriceCheck(ConsensusResult),
    Verdict(VerdictSummary),
    Signal(TradeSignal),
}

impl SignalEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalEvent::PriceCheck(_) => "price_check",
            SignalEvent::Verdict(_) => "verdict",
            SignalEvent::Signal(_) => "signal",
        }
    }
}

/// Trait for signal storage backends
///
/// The pipeline treats `record` as fire-and-forget: an error is logged and
/// the cycle carries on.
#[async_trait::async_trait]
pub trait SignalStore: Send + Sync {
    async fn record(&self, event: &SignalEvent) -> Result<()>;
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub price_checks: usize,
    pub rejected_price_checks: usize,
    pub verdicts: usize,
    pub anomalies: usize,
    pub signals: usize,
    pub newest_signal: Option<DateTime<Utc>>,
}

/// In-memory store (for testing and development)
pub struct InMemorySignalStore {
    events: tokio::sync::RwLock<Vec<SignalEvent>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self {
            events: tokio::sync::RwLock::new(Vec::new()),
        }
    }

    /// All events in arrival order
    pub async fn events(&self) -> Vec<SignalEvent> {
        self.events.read().await.clone()
    }

    pub async fn signals(&self) -> Vec<TradeSignal> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                SignalEvent::Signal(signal) => Some(signal.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn get_signal(&self, signal_id: Uuid) -> Option<TradeSignal> {
        self.signals().await.into_iter().find(|s| s.id == signal_id)
    }

    pub async fn stats(&self) -> StoreStats {
        let events = self.events.read().await;
        let mut stats = StoreStats::default();

        for event in events.iter() {
            match event {
                SignalEvent::PriceCheck(check) => {
                    stats.price_checks += 1;
                    if !check.is_ok() {
                        stats.rejected_price_checks += 1;
                    }
                }
                SignalEvent::Verdict(verdict) => {
                    stats.verdicts += 1;
                    if verdict.is_anomaly {
                        stats.anomalies += 1;
                    }
                }
                SignalEvent::Signal(signal) => {
                    stats.signals += 1;
                    if stats.newest_signal.map_or(true, |t| signal.created_at > t) {
                        stats.newest_signal = Some(signal.created_at);
                    }
                }
            }
        }

        stats
    }
}

impl Default for InMemorySignalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SignalStore for InMemorySignalStore {
    async fn record(&self, event: &SignalEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceResult;
    use crate::reconcile::reconcile;
    use common::{Candidate, Quote};
    use portfolio_risk::size_position;

    fn test_signal() -> TradeSignal {
        TradeSignal::new(
            Candidate {
                asset_id: "SOL".to_string(),
                change_pct: 3.0,
                price: 100.0,
            },
            ConfidenceResult {
                score: 70,
                reasons: vec!["test".to_string()],
            },
            size_position(100.0, 0.05, 3.0, 1000.0, 0.02).unwrap(),
            vec!["BTC".to_string(), "ETH".to_string(), "BNB".to_string()],
            Some(4),
        )
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemorySignalStore::new();

        let ok = reconcile(
            "SOL",
            &[Ok(Quote::new("cg", "SOL", 100.0)), Ok(Quote::new("kc", "SOL", 100.1))],
            1.0,
        );
        let bad = reconcile("BTC", &[Ok(Quote::new("cg", "BTC", 100.0))], 1.0);
        let signal = test_signal();

        store.record(&SignalEvent::PriceCheck(ok)).await.unwrap();
        store.record(&SignalEvent::PriceCheck(bad)).await.unwrap();
        store.record(&SignalEvent::Signal(signal.clone())).await.unwrap();

        let retrieved = store.get_signal(signal.id).await;
        assert_eq!(retrieved.map(|s| s.id), Some(signal.id));

        let stats = store.stats().await;
        assert_eq!(stats.price_checks, 2);
        assert_eq!(stats.rejected_price_checks, 1);
        assert_eq!(stats.signals, 1);
        assert_eq!(stats.newest_signal, Some(signal.created_at));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(SignalEvent::Signal(test_signal())).unwrap();
        assert_eq!(json["kind"], "signal");
        assert_eq!(json["data"]["candidate"]["asset_id"], "SOL");
    }
}
