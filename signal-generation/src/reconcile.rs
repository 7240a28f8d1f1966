// Price Reconciliation
// Cross-checks quotes from independent providers before an asset enters the snapshot

use common::{MarketEntry, QuoteResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default maximum pairwise disagreement between providers (percent)
pub const DEFAULT_TOLERANCE_PCT: f64 = 1.0;

/// Outcome of a consensus check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusStatus {
    Ok,
    Discrepancy,
    InsufficientData,
}

impl ConsensusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusStatus::Ok => "OK",
            ConsensusStatus::Discrepancy => "DISCREPANCY",
            ConsensusStatus::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

/// Why an asset was left out of the current snapshot
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ReconcileFault {
    #[error("{asset_id}: only {valid_quotes} valid quote(s), need at least 2")]
    InsufficientData { asset_id: String, valid_quotes: usize },

    #[error("{asset_id}: providers disagree by {deviation_pct:.4}% (tolerance {tolerance_pct:.4}%)")]
    Discrepancy {
        asset_id: String,
        deviation_pct: f64,
        tolerance_pct: f64,
    },

    #[error("{asset_id}: no provider reported a 24h change")]
    MissingChange { asset_id: String },
}

impl ReconcileFault {
    pub fn asset_id(&self) -> &str {
        match self {
            ReconcileFault::InsufficientData { asset_id, .. }
            | ReconcileFault::Discrepancy { asset_id, .. }
            | ReconcileFault::MissingChange { asset_id } => asset_id,
        }
    }
}

/// Consensus over all valid quotes for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub asset_id: String,
    /// Arithmetic mean of the valid prices (0.0 when there are none)
    pub consensus_price: f64,
    /// Largest gap between any two valid prices, relative to the mean, in percent
    pub max_pairwise_deviation_pct: f64,
    /// Largest `|price - mean| / mean`, in percent
    pub max_deviation_from_mean_pct: f64,
    /// Mean of the 24h changes reported by valid quotes
    pub change_24h_pct: Option<f64>,
    pub valid_quotes: usize,
    pub tolerance_pct: f64,
    pub status: ConsensusStatus,
}

impl ConsensusResult {
    pub fn is_ok(&self) -> bool {
        self.status == ConsensusStatus::Ok
    }

    /// The structured failure for a non-OK result
    pub fn fault(&self) -> Option<ReconcileFault> {
        match self.status {
            ConsensusStatus::Ok => None,
            ConsensusStatus::InsufficientData => Some(ReconcileFault::InsufficientData {
                asset_id: self.asset_id.clone(),
                valid_quotes: self.valid_quotes,
            }),
            ConsensusStatus::Discrepancy => Some(ReconcileFault::Discrepancy {
                asset_id: self.asset_id.clone(),
                deviation_pct: self.max_pairwise_deviation_pct,
                tolerance_pct: self.tolerance_pct,
            }),
        }
    }

    /// Snapshot entry for an OK result that also has a 24h change
    pub fn to_entry(&self) -> Result<MarketEntry, ReconcileFault> {
        if let Some(fault) = self.fault() {
            return Err(fault);
        }
        let change_24h_pct = self.change_24h_pct.ok_or_else(|| ReconcileFault::MissingChange {
            asset_id: self.asset_id.clone(),
        })?;

        Ok(MarketEntry {
            asset_id: self.asset_id.clone(),
            price: self.consensus_price,
            change_24h_pct,
        })
    }
}

/// Reconcile provider readings for `asset_id`
///
/// Failed readings, non-positive prices and quotes for another asset are
/// ignored. Status is OK iff at least two valid quotes remain and their
/// pairwise spread relative to the mean is within `tolerance_pct`.
pub fn reconcile(asset_id: &str, readings: &[QuoteResult], tolerance_pct: f64) -> ConsensusResult {
    let valid: Vec<_> = readings
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .filter(|q| q.asset_id == asset_id && q.is_valid())
        .collect();

    let valid_quotes = valid.len();
    let mean = if valid.is_empty() {
        0.0
    } else {
        valid.iter().map(|q| q.price).sum::<f64>() / valid_quotes as f64
    };

    let changes: Vec<f64> = valid
        .iter()
        .filter_map(|q| q.change_24h_pct)
        .filter(|c| c.is_finite())
        .collect();
    let change_24h_pct = if changes.is_empty() {
        None
    } else {
        Some(changes.iter().sum::<f64>() / changes.len() as f64)
    };

    if valid_quotes < 2 {
        debug!(asset = asset_id, valid_quotes, "Not enough valid quotes for consensus");
        return ConsensusResult {
            asset_id: asset_id.to_string(),
            consensus_price: mean,
            max_pairwise_deviation_pct: 0.0,
            max_deviation_from_mean_pct: 0.0,
            change_24h_pct,
            valid_quotes,
            tolerance_pct,
            status: ConsensusStatus::InsufficientData,
        };
    }

    let min = valid.iter().map(|q| q.price).fold(f64::INFINITY, f64::min);
    let max = valid.iter().map(|q| q.price).fold(f64::NEG_INFINITY, f64::max);
    let max_pairwise_deviation_pct = (max - min) / mean * 100.0;
    let max_deviation_from_mean_pct = valid
        .iter()
        .map(|q| (q.price - mean).abs() / mean * 100.0)
        .fold(0.0, f64::max);

    let status = if max_pairwise_deviation_pct <= tolerance_pct {
        ConsensusStatus::Ok
    } else {
        ConsensusStatus::Discrepancy
    };

    debug!(
        asset = asset_id,
        consensus_price = mean,
        deviation_pct = max_pairwise_deviation_pct,
        tolerance_pct,
        status = status.as_str(),
        "Price consensus checked"
    );

    ConsensusResult {
        asset_id: asset_id.to_string(),
        consensus_price: mean,
        max_pairwise_deviation_pct,
        max_deviation_from_mean_pct,
        change_24h_pct,
        valid_quotes,
        tolerance_pct,
        status,
    }
}

/// Reconciler bound to a configured tolerance
#[derive(Debug, Clone)]
pub struct PriceReconciler {
    tolerance_pct: f64,
}

impl PriceReconciler {
    pub fn new(tolerance_pct: f64) -> Self {
        Self { tolerance_pct }
    }

    pub fn tolerance_pct(&self) -> f64 {
        self.tolerance_pct
    }

    pub fn reconcile(&self, asset_id: &str, readings: &[QuoteResult]) -> ConsensusResult {
        reconcile(asset_id, readings, self.tolerance_pct)
    }
}

impl Default for PriceReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_PCT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Quote, SourceFailure};

    fn quote(source: &str, price: f64) -> QuoteResult {
        Ok(Quote::new(source, "BTC", price))
    }

    #[test]
    fn test_identical_quotes_always_ok() {
        for tolerance in [0.0, 0.5, 2.0] {
            let result = reconcile("BTC", &[quote("cg", 27_100.0), quote("kc", 27_100.0)], tolerance);
            assert_eq!(result.status, ConsensusStatus::Ok);
            assert_eq!(result.max_pairwise_deviation_pct, 0.0);
            assert_eq!(result.consensus_price, 27_100.0);
        }
    }

    #[test]
    fn test_pairwise_deviation_formula() {
        let result = reconcile("BTC", &[quote("cg", 100.0), quote("kc", 103.0)], 2.0);

        assert_eq!(result.consensus_price, 101.5);
        // |100 - 103| / 101.5 * 100
        assert!((result.max_pairwise_deviation_pct - 300.0 / 101.5).abs() < 1e-12);
        assert!((result.max_pairwise_deviation_pct - 2.955665).abs() < 1e-6);
        // |100 - 101.5| / 101.5 * 100
        assert!((result.max_deviation_from_mean_pct - 150.0 / 101.5).abs() < 1e-12);
        assert_eq!(result.status, ConsensusStatus::Discrepancy);
        assert!(matches!(result.fault(), Some(ReconcileFault::Discrepancy { .. })));
    }

    #[test]
    fn test_within_tolerance() {
        let result = reconcile(
            "BTC",
            &[quote("cg", 27_100.0), quote("kc", 27_105.0), quote("bn", 27_090.0)],
            1.0,
        );
        assert!(result.is_ok());
        assert_eq!(result.valid_quotes, 3);
    }

    #[test]
    fn test_insufficient_data() {
        let readings = vec![
            quote("cg", 100.0),
            Err(SourceFailure::new("kc", "BTC", "timeout")),
            quote("bn", 0.0),
        ];
        let result = reconcile("BTC", &readings, 1.0);

        assert_eq!(result.status, ConsensusStatus::InsufficientData);
        assert_eq!(result.valid_quotes, 1);
        assert_eq!(
            result.fault(),
            Some(ReconcileFault::InsufficientData {
                asset_id: "BTC".to_string(),
                valid_quotes: 1
            })
        );
        assert_eq!(reconcile("BTC", &[], 1.0).status, ConsensusStatus::InsufficientData);
    }

    #[test]
    fn test_quotes_for_other_assets_are_ignored() {
        let readings = vec![
            quote("cg", 100.0),
            Ok(Quote::new("kc", "ETH", 100.0)),
        ];
        assert_eq!(
            reconcile("BTC", &readings, 1.0).status,
            ConsensusStatus::InsufficientData
        );
    }

    #[test]
    fn test_entry_requires_change() {
        let readings = vec![
            Ok(Quote::new("cg", "BTC", 100.0).with_change(2.0)),
            Ok(Quote::new("kc", "BTC", 100.2).with_change(3.0)),
        ];
        let entry = reconcile("BTC", &readings, 1.0).to_entry().unwrap();
        assert_eq!(entry.change_24h_pct, 2.5);
        assert!((entry.price - 100.1).abs() < 1e-9);

        let readings = vec![quote("cg", 100.0), quote("kc", 100.0)];
        assert_eq!(
            reconcile("BTC", &readings, 1.0).to_entry(),
            Err(ReconcileFault::MissingChange {
                asset_id: "BTC".to_string()
            })
        );
    }

    #[test]
    fn test_change_from_single_reporting_source() {
        let readings = vec![
            Ok(Quote::new("cg", "BTC", 100.0).with_change(-1.5)),
            quote("kc", 100.0),
        ];
        let result = reconcile("BTC", &readings, 1.0);
        assert_eq!(result.change_24h_pct, Some(-1.5));
    }
}
