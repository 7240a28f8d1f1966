//! Position sizing & exposure control
//!
//! This crate turns an entry price into a bounded-risk long plan (stop,
//! take-profit, size) and decides whether that plan still fits within the
//! portfolio's exposure limits.

mod config;
mod risk;
mod sizing;

pub use config::{create_config_template, load_config, save_config, ExposureLimits, RiskConfig};
pub use risk::{ExposureChecker, ExposureViolation};
pub use sizing::{size_position, stop_price, take_profit_price, PositionSizer, RiskPlan, SizingError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Why a candidate could not be turned into an admissible plan
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RiskRejection {
    #[error("sizing failed: {0}")]
    Sizing(#[from] SizingError),

    #[error("exposure limit: {0}")]
    Exposure(#[from] ExposureViolation),
}

/// Main entry point for sizing a candidate and checking it against open exposure
#[derive(Debug, Clone)]
pub struct RiskManager {
    sizer: PositionSizer,
    exposure: ExposureChecker,
    config: RiskConfig,
}

impl RiskManager {
    /// Create a new risk manager with default configuration
    pub fn new() -> Self {
        Self::with_config(RiskConfig::default())
    }

    /// Create a new risk manager with custom configuration
    pub fn with_config(config: RiskConfig) -> Self {
        Self {
            sizer: PositionSizer::from_config(&config),
            exposure: ExposureChecker::new(config.limits.clone()),
            config,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn sizer(&self) -> &PositionSizer {
        &self.sizer
    }

    /// Size a long entry, then make sure it fits beside `open_positions`
    pub fn evaluate(
        &self,
        entry_price: f64,
        equity: f64,
        open_positions: &[RiskPlan],
    ) -> Result<RiskPlan, RiskRejection> {
        let plan = self.sizer.plan(entry_price, equity)?;
        debug!(
            entry = plan.entry_price,
            stop = plan.stop_price,
            target = plan.take_profit_price,
            size = plan.size,
            "Plan sized"
        );

        self.exposure.check(open_positions, &plan, equity)?;

        info!(
            entry = plan.entry_price,
            size = plan.size,
            risk_amount = plan.risk_amount,
            open_positions = open_positions.len(),
            "Plan approved"
        );
        Ok(plan)
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_approves_within_limits() {
        let manager = RiskManager::with_config(RiskConfig {
            volatility_pct: 0.08,
            ..Default::default()
        });

        let plan = manager.evaluate(100.0, 1000.0, &[]).unwrap();
        assert!((plan.size - 2.5).abs() < 1e-9);
        assert!((plan.take_profit_price - 124.0).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_reports_sizing_failure() {
        let manager = RiskManager::new();
        let result = manager.evaluate(-5.0, 1000.0, &[]);
        assert_eq!(result, Err(RiskRejection::Sizing(SizingError::InvalidEntry(-5.0))));
    }

    #[test]
    fn test_evaluate_reports_exposure_violation() {
        let manager = RiskManager::new();
        let open: Vec<RiskPlan> = (0..3)
            .map(|_| manager.evaluate(50.0, 1000.0, &[]).unwrap())
            .collect();

        let result = manager.evaluate(50.0, 1000.0, &open);
        assert!(matches!(
            result,
            Err(RiskRejection::Exposure(ExposureViolation::MaxOpenPositionsReached { .. }))
        ));
    }
}
