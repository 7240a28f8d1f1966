//! Volatility-stop position sizing
//!
//! A long entry gets a stop `volatility_pct` below entry, a target at
//! `reward_risk_ratio` times the risk distance above entry, and a size such
//! that hitting the stop loses exactly `risk_fraction` of equity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RiskConfig;

/// Sizing failures; each one drops the candidate for the current cycle only
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum SizingError {
    #[error("stop {stop:.8} is not strictly between 0 and entry {entry:.8}")]
    InvalidStop { entry: f64, stop: f64 },

    #[error("entry price must be positive, got {0}")]
    InvalidEntry(f64),

    #[error("equity must be positive, got {0}")]
    InvalidEquity(f64),

    #[error("risk fraction must be in (0, 1], got {0}")]
    InvalidRiskFraction(f64),

    #[error("reward/risk ratio must be positive, got {0}")]
    InvalidRewardRisk(f64),
}

/// Bounded-risk plan for a single long entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPlan {
    pub entry_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    /// Units to buy
    pub size: f64,
    /// Equity lost if the stop is hit
    pub risk_amount: f64,
    /// Risk as percent of equity (2.0 = 2%)
    pub risk_pct: f64,
    pub reward_risk_ratio: f64,
}

impl RiskPlan {
    /// Distance between entry and stop per unit
    pub fn risk_per_unit(&self) -> f64 {
        self.entry_price - self.stop_price
    }

    /// Notional value of the position at entry
    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }
}

fn ensure_entry(entry_price: f64) -> Result<(), SizingError> {
    if entry_price.is_finite() && entry_price > 0.0 {
        Ok(())
    } else {
        Err(SizingError::InvalidEntry(entry_price))
    }
}

/// `entry * (1 - volatility_pct)`; fails unless the stop lands strictly inside `(0, entry)`
pub fn stop_price(entry_price: f64, volatility_pct: f64) -> Result<f64, SizingError> {
    ensure_entry(entry_price)?;

    let stop = entry_price * (1.0 - volatility_pct);
    if stop.is_finite() && stop > 0.0 && stop < entry_price {
        Ok(stop)
    } else {
        Err(SizingError::InvalidStop {
            entry: entry_price,
            stop,
        })
    }
}

/// `entry + (entry - stop) * reward_risk_ratio`
pub fn take_profit_price(
    entry_price: f64,
    stop_price: f64,
    reward_risk_ratio: f64,
) -> Result<f64, SizingError> {
    ensure_entry(entry_price)?;

    let risk_per_unit = entry_price - stop_price;
    if !(risk_per_unit > 0.0) || stop_price <= 0.0 {
        return Err(SizingError::InvalidStop {
            entry: entry_price,
            stop: stop_price,
        });
    }
    if !(reward_risk_ratio.is_finite() && reward_risk_ratio > 0.0) {
        return Err(SizingError::InvalidRewardRisk(reward_risk_ratio));
    }

    Ok(entry_price + risk_per_unit * reward_risk_ratio)
}

/// Full plan: stop, target and a size risking `equity * risk_fraction`
pub fn size_position(
    entry_price: f64,
    volatility_pct: f64,
    reward_risk_ratio: f64,
    equity: f64,
    risk_fraction: f64,
) -> Result<RiskPlan, SizingError> {
    if !(equity.is_finite() && equity > 0.0) {
        return Err(SizingError::InvalidEquity(equity));
    }
    if !(risk_fraction > 0.0 && risk_fraction <= 1.0) {
        return Err(SizingError::InvalidRiskFraction(risk_fraction));
    }

    let stop = stop_price(entry_price, volatility_pct)?;
    let take_profit = take_profit_price(entry_price, stop, reward_risk_ratio)?;

    let risk_per_unit = entry_price - stop;
    let risk_amount = equity * risk_fraction;
    let size = risk_amount / risk_per_unit;

    Ok(RiskPlan {
        entry_price,
        stop_price: stop,
        take_profit_price: take_profit,
        size,
        risk_amount,
        risk_pct: risk_fraction * 100.0,
        reward_risk_ratio,
    })
}

/// Sizer bound to a configured stop distance, reward/risk ratio and risk fraction
#[derive(Debug, Clone)]
pub struct PositionSizer {
    volatility_pct: f64,
    reward_risk_ratio: f64,
    risk_fraction: f64,
}

impl PositionSizer {
    pub fn new(volatility_pct: f64, reward_risk_ratio: f64, risk_fraction: f64) -> Self {
        Self {
            volatility_pct,
            reward_risk_ratio,
            risk_fraction,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(
            config.volatility_pct,
            config.reward_risk_ratio,
            config.risk_fraction,
        )
    }

    pub fn stop_price(&self, entry_price: f64) -> Result<f64, SizingError> {
        stop_price(entry_price, self.volatility_pct)
    }

    pub fn take_profit_price(&self, entry_price: f64) -> Result<f64, SizingError> {
        let stop = self.stop_price(entry_price)?;
        take_profit_price(entry_price, stop, self.reward_risk_ratio)
    }

    pub fn plan(&self, entry_price: f64, equity: f64) -> Result<RiskPlan, SizingError> {
        size_position(
            entry_price,
            self.volatility_pct,
            self.reward_risk_ratio,
            equity,
            self.risk_fraction,
        )
    }
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::from_config(&RiskConfig::default())
    }
}
