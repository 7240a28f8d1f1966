//! Portfolio exposure checks applied after a plan has been sized

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ExposureLimits;
use crate::sizing::RiskPlan;

// Aggregate risk is a sum of float products; allow for rounding at the limit.
const RISK_EPSILON: f64 = 1e-9;

/// Exposure limit violations
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ExposureViolation {
    #[error("Number of open positions {current} has reached limit {limit}")]
    MaxOpenPositionsReached { current: usize, limit: usize },

    #[error(
        "Open risk {current_pct:.2}% + {proposed_pct:.2}% exceeds portfolio limit {limit_pct:.2}%"
    )]
    MaxPortfolioRiskExceeded {
        current_pct: f64,
        proposed_pct: f64,
        limit_pct: f64,
    },
}

/// Checks a proposed plan against the plans already open
#[derive(Debug, Clone, Default)]
pub struct ExposureChecker {
    limits: ExposureLimits,
}

impl ExposureChecker {
    pub fn new(limits: ExposureLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ExposureLimits {
        &self.limits
    }

    /// Aggregate risk of `open` as a fraction of equity
    pub fn open_risk_fraction(open: &[RiskPlan], equity: f64) -> f64 {
        if equity <= 0.0 {
            return 0.0;
        }
        open.iter().map(|p| p.risk_amount).sum::<f64>() / equity
    }

    pub fn check(
        &self,
        open: &[RiskPlan],
        proposed: &RiskPlan,
        equity: f64,
    ) -> Result<(), ExposureViolation> {
        if open.len() >= self.limits.max_open_positions {
            return Err(ExposureViolation::MaxOpenPositionsReached {
                current: open.len(),
                limit: self.limits.max_open_positions,
            });
        }

        let current = Self::open_risk_fraction(open, equity);
        let added = if equity > 0.0 {
            proposed.risk_amount / equity
        } else {
            f64::INFINITY
        };

        debug!(
            open_positions = open.len(),
            current_risk = current,
            proposed_risk = added,
            limit = self.limits.max_portfolio_risk,
            "Exposure check"
        );

        if current + added > self.limits.max_portfolio_risk + RISK_EPSILON {
            return Err(ExposureViolation::MaxPortfolioRiskExceeded {
                current_pct: current * 100.0,
                proposed_pct: added * 100.0,
                limit_pct: self.limits.max_portfolio_risk * 100.0,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizing::size_position;

    fn plan(risk_fraction: f64) -> RiskPlan {
        size_position(100.0, 0.05, 3.0, 1000.0, risk_fraction).unwrap()
    }

    #[test]
    fn test_empty_book_admits_plan() {
        let checker = ExposureChecker::default();
        assert!(checker.check(&[], &plan(0.02), 1000.0).is_ok());
    }

    #[test]
    fn test_max_open_positions() {
        let checker = ExposureChecker::default();
        let open = vec![plan(0.02), plan(0.02), plan(0.02)];

        let err = checker.check(&open, &plan(0.02), 1000.0).unwrap_err();
        assert_eq!(
            err,
            ExposureViolation::MaxOpenPositionsReached { current: 3, limit: 3 }
        );
    }

    #[test]
    fn test_aggregate_risk_limit() {
        let checker = ExposureChecker::new(ExposureLimits {
            max_open_positions: 10,
            max_portfolio_risk: 0.10,
        });

        // 4 x 2% open + 2% proposed = 10%, exactly at the limit
        let open = vec![plan(0.02), plan(0.02), plan(0.02), plan(0.02)];
        assert!(checker.check(&open, &plan(0.02), 1000.0).is_ok());

        let open = vec![plan(0.04), plan(0.04)];
        let err = checker.check(&open, &plan(0.03), 1000.0).unwrap_err();
        assert!(matches!(err, ExposureViolation::MaxPortfolioRiskExceeded { .. }));
        assert_eq!(
            err.to_string(),
            "Open risk 8.00% + 3.00% exceeds portfolio limit 10.00%"
        );
    }
}
