//! Runtime configuration for the anomaly hunter
//!
//! Layers, later wins: built-in defaults, an optional TOML file, then
//! `ANOMALY__*` environment variables (`ANOMALY__PIPELINE__MIN_CONFIDENCE=70`).
//! A `.env` file is loaded first.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use portfolio_risk::RiskConfig;
use serde::{Deserialize, Serialize};
use signal_generation::PipelineConfig;
use std::collections::HashMap;
use std::time::Duration;

use crate::connectors::coingecko::COINGECKO_API;
use crate::connectors::cryptopanic::CRYPTOPANIC_API;
use crate::connectors::kucoin::KUCOIN_API;
use crate::notify::telegram::TELEGRAM_API;

pub const DEFAULT_CONFIG_PATH: &str = "anomaly-hunter.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub pipeline: PipelineConfig,
    pub risk: RiskConfig,
    pub providers: ProvidersConfig,
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seconds between cycles
    pub interval_secs: u64,
    /// Account equity used for sizing
    pub equity: f64,
    pub database_url: String,
    /// HTTP timeout for every provider, in seconds
    pub http_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            equity: 1000.0,
            database_url: "sqlite://anomaly_hunter.db".to_string(),
            http_timeout_secs: 10,
        }
    }
}

impl RuntimeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub coingecko_url: String,
    pub kucoin_url: String,
    pub cryptopanic_url: String,
    /// Without a token no news lookups are made
    pub cryptopanic_token: Option<String>,
    /// Extra symbol -> CoinGecko id mappings
    pub coin_ids: HashMap<String, String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            coingecko_url: COINGECKO_API.to_string(),
            kucoin_url: KUCOIN_API.to_string(),
            cryptopanic_url: CRYPTOPANIC_API.to_string(),
            cryptopanic_token: None,
            coin_ids: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_url: String,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: TELEGRAM_API.to_string(),
            bot_token: None,
            chat_id: None,
        }
    }
}

impl TelegramConfig {
    /// Token and chat id, when both are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.bot_token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => Some((token, chat)),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Load from `path` (optional) and the environment, then validate
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).context("Failed to encode defaults")?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("ANOMALY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pipeline.tracked_assets"),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.apply_legacy_env();
        config.validate()?;
        Ok(config)
    }

    /// Plain credential variables, for `.env` files written for the old bot
    fn apply_legacy_env(&mut self) {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if self.telegram.bot_token.is_none() {
            self.telegram.bot_token = var("TELEGRAM_BOT_TOKEN");
        }
        if self.telegram.chat_id.is_none() {
            self.telegram.chat_id = var("TELEGRAM_CHAT_ID");
        }
        if self.providers.cryptopanic_token.is_none() {
            self.providers.cryptopanic_token = var("CRYPTOPANIC_API_KEY");
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate().context("Invalid pipeline configuration")?;
        self.risk.validate().context("Invalid risk configuration")?;

        if self.runtime.interval_secs == 0 {
            bail!("runtime.interval_secs must be positive");
        }
        if !(self.runtime.equity.is_finite() && self.runtime.equity > 0.0) {
            bail!("runtime.equity must be positive, got {}", self.runtime.equity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.runtime.interval(), Duration::from_secs(300));
        assert_eq!(config.pipeline.min_confidence, 60);
        assert!(config.telegram.credentials().is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("anomaly-hunter-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[runtime]
equity = 5000.0

[pipeline]
tracked_assets = ["BTC", "ETH", "SOL", "BNB", "XRP"]
min_confidence = 70

[risk]
risk_fraction = 0.01
"#
        )
        .unwrap();

        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.runtime.equity, 5000.0);
        assert_eq!(config.runtime.interval_secs, 300);
        assert_eq!(config.pipeline.tracked_assets.len(), 5);
        assert_eq!(config.pipeline.min_confidence, 70);
        assert_eq!(config.risk.risk_fraction, 0.01);
        assert_eq!(config.risk.reward_risk_ratio, 3.0);
    }

    #[test]
    fn test_invalid_runtime_is_rejected() {
        let mut config = AppConfig::default();
        config.runtime.equity = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let telegram = TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            chat_id: None,
            ..Default::default()
        };
        assert!(telegram.credentials().is_none());

        let telegram = TelegramConfig {
            chat_id: Some("-100".to_string()),
            ..telegram
        };
        assert_eq!(telegram.credentials(), Some(("123:abc", "-100")));
    }
}
