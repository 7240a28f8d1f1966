// Anomaly Classification
// Detects "a few green coins in a sea of red" across the tracked universe

use chrono::{DateTime, Utc};
use common::{Candidate, MarketSnapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fewest green assets that still count as an opportunity
pub const MIN_GREEN: usize = 1;
/// More green than this is a broad rally, not an anomaly
pub const MAX_GREEN: usize = 2;
/// Minimum number of red assets for a selling backdrop
pub const MIN_RED: usize = 3;

/// Bucket thresholds on 24h change, in percent; both comparisons are strict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    /// `change > green_pct` puts an asset in the green bucket
    pub green_pct: f64,
    /// `change < red_pct` puts an asset in the red bucket
    pub red_pct: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            green_pct: 0.5,
            red_pct: -1.0,
        }
    }
}

/// Classification of one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    /// Green assets in snapshot order
    pub green: Vec<Candidate>,
    /// Red assets in snapshot order
    pub red: Vec<Candidate>,
    pub total_assets: usize,
    pub observed_at: DateTime<Utc>,
}

impl AnomalyVerdict {
    /// The verdict narrowed to each green candidate, in snapshot order
    pub fn candidates(&self) -> impl Iterator<Item = CandidateVerdict> + '_ {
        self.green.iter().map(move |candidate| CandidateVerdict {
            candidate: candidate.clone(),
            is_anomaly: self.is_anomaly,
            green_count: self.green.len(),
            red: self.red.clone(),
            total_assets: self.total_assets,
        })
    }

    pub fn summary(&self) -> VerdictSummary {
        VerdictSummary {
            is_anomaly: self.is_anomaly,
            green_assets: self.green.iter().map(|c| c.asset_id.clone()).collect(),
            red_assets: self.red.iter().map(|c| c.asset_id.clone()).collect(),
            total_assets: self.total_assets,
            observed_at: self.observed_at,
        }
    }
}

/// A verdict narrowed to a single green candidate, as the scorer consumes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateVerdict {
    pub candidate: Candidate,
    pub is_anomaly: bool,
    /// Size of the full green bucket the candidate came from
    pub green_count: usize,
    pub red: Vec<Candidate>,
    pub total_assets: usize,
}

impl CandidateVerdict {
    /// Mean absolute 24h change of the red bucket
    pub fn red_intensity(&self) -> f64 {
        if self.red.is_empty() {
            return 0.0;
        }
        (self.red.iter().map(|c| c.change_pct).sum::<f64>() / self.red.len() as f64).abs()
    }

    /// Share of the universe that is green
    pub fn green_ratio(&self) -> f64 {
        if self.total_assets == 0 {
            return 0.0;
        }
        self.green_count as f64 / self.total_assets as f64
    }
}

/// Compact verdict record for persistence and logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictSummary {
    pub is_anomaly: bool,
    pub green_assets: Vec<String>,
    pub red_assets: Vec<String>,
    pub total_assets: usize,
    pub observed_at: DateTime<Utc>,
}

/// Whether bucket sizes form the target shape
pub fn is_anomaly_shape(green: usize, red: usize) -> bool {
    (MIN_GREEN..=MAX_GREEN).contains(&green) && red >= MIN_RED
}

/// Bucket every asset of `snapshot` and decide whether it is an anomaly
pub fn classify(snapshot: &MarketSnapshot, thresholds: &AnomalyThresholds) -> AnomalyVerdict {
    let mut green = Vec::new();
    let mut red = Vec::new();

    for entry in snapshot.iter() {
        if entry.change_24h_pct > thresholds.green_pct {
            green.push(Candidate::from(entry));
        } else if entry.change_24h_pct < thresholds.red_pct {
            red.push(Candidate::from(entry));
        }
    }

    let is_anomaly = is_anomaly_shape(green.len(), red.len());

    debug!(
        green = green.len(),
        red = red.len(),
        total = snapshot.len(),
        is_anomaly,
        "Snapshot classified"
    );

    AnomalyVerdict {
        is_anomaly,
        green,
        red,
        total_assets: snapshot.len(),
        observed_at: snapshot.observed_at,
    }
}

/// Classifier bound to configured thresholds
#[derive(Debug, Clone, Default)]
pub struct AnomalyClassifier {
    thresholds: AnomalyThresholds,
}

impl AnomalyClassifier {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    pub fn classify(&self, snapshot: &MarketSnapshot) -> AnomalyVerdict {
        classify(snapshot, &self.thresholds)
    }
}
