//! Risk management configuration

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Per-trade sizing parameters and portfolio-level limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of equity risked per trade (0.02 = 2%)
    #[serde(default = "default_risk_fraction")]
    pub risk_fraction: f64,

    /// Target distance as a multiple of the stop distance
    #[serde(default = "default_reward_risk_ratio")]
    pub reward_risk_ratio: f64,

    /// Stop distance below entry as a fraction of entry (0.05 = 5%)
    #[serde(default = "default_volatility_pct")]
    pub volatility_pct: f64,

    /// Portfolio-level exposure limits
    #[serde(default)]
    pub limits: ExposureLimits,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_fraction: default_risk_fraction(),
            reward_risk_ratio: default_reward_risk_ratio(),
            volatility_pct: default_volatility_pct(),
            limits: ExposureLimits::default(),
        }
    }
}

impl RiskConfig {
    /// Reject values the sizer could never turn into a valid plan
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.risk_fraction > 0.0 && self.risk_fraction <= 1.0) {
            bail!("risk_fraction must be in (0, 1], got {}", self.risk_fraction);
        }
        if !(self.volatility_pct > 0.0 && self.volatility_pct < 1.0) {
            bail!("volatility_pct must be in (0, 1), got {}", self.volatility_pct);
        }
        if !(self.reward_risk_ratio > 0.0) {
            bail!("reward_risk_ratio must be positive, got {}", self.reward_risk_ratio);
        }
        if self.limits.max_open_positions == 0 {
            bail!("limits.max_open_positions must be at least 1");
        }
        if !(self.limits.max_portfolio_risk > 0.0 && self.limits.max_portfolio_risk <= 1.0) {
            bail!(
                "limits.max_portfolio_risk must be in (0, 1], got {}",
                self.limits.max_portfolio_risk
            );
        }
        if self.risk_fraction > self.limits.max_portfolio_risk {
            bail!(
                "risk_fraction {} exceeds limits.max_portfolio_risk {}",
                self.risk_fraction,
                self.limits.max_portfolio_risk
            );
        }
        Ok(())
    }
}

fn default_risk_fraction() -> f64 {
    0.02
}

fn default_reward_risk_ratio() -> f64 {
    3.0
}

fn default_volatility_pct() -> f64 {
    0.05
}

/// Limits on concurrently open plans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureLimits {
    /// Maximum number of open positions
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,

    /// Maximum aggregate risk of open positions as a fraction of equity
    #[serde(default = "default_max_portfolio_risk")]
    pub max_portfolio_risk: f64,
}

impl Default for ExposureLimits {
    fn default() -> Self {
        Self {
            max_open_positions: default_max_open_positions(),
            max_portfolio_risk: default_max_portfolio_risk(),
        }
    }
}

fn default_max_open_positions() -> usize {
    3
}

fn default_max_portfolio_risk() -> f64 {
    0.10
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> anyhow::Result<RiskConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let config: RiskConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to TOML file
pub fn save_config(config: &RiskConfig, path: &str) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Create a default configuration file template
pub fn create_config_template(path: &str) -> anyhow::Result<()> {
    let template = "# Position sizing and exposure configuration

# Fraction of equity risked per trade (0.02 = 2%)
risk_fraction = 0.02

# Take-profit distance as a multiple of the stop distance (1:3)
reward_risk_ratio = 3.0

# Stop distance below entry (0.05 = 5%)
volatility_pct = 0.05

[limits]
# Maximum concurrently open positions
max_open_positions = 3

# Maximum aggregate open risk as a fraction of equity (0.10 = 10%)
max_portfolio_risk = 0.10
";

    std::fs::write(path, template)?;
    Ok(())
}
