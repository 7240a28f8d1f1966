use chrono::{DateTime, Utc};
use common::Candidate;
use portfolio_risk::RiskPlan;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::confidence::ConfidenceResult;

/// Signal direction; the strategy only goes long
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalDirection {
    Long,
}

/// Final artifact of a cycle: the chosen candidate, why, and how to trade it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeSignal {
    pub id: Uuid,
    pub direction: SignalDirection,
    pub candidate: Candidate,
    pub confidence: ConfidenceResult,
    pub plan: RiskPlan,
    /// Assets that were red when the signal fired
    pub red_assets: Vec<String>,
    /// Articles found for the candidate, if the news source answered
    pub article_count: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl TradeSignal {
    pub fn new(
        candidate: Candidate,
        confidence: ConfidenceResult,
        plan: RiskPlan,
        red_assets: Vec<String>,
        article_count: Option<u32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction: SignalDirection::Long,
            candidate,
            confidence,
            plan,
            red_assets,
            article_count,
            created_at: Utc::now(),
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.candidate.asset_id
    }

    pub fn score(&self) -> u8 {
        self.confidence.score
    }
}
