use anyhow::{anyhow, Context, Result};
use common::{Quote, QuoteResult, SourceFailure};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::rate_limit::RateLimiter;
use crate::feed::QuoteProvider;

pub const COINGECKO_API: &str = "https://api.coingecko.com/api/v3";
const SOURCE_ID: &str = "coingecko";

/// Default symbol -> CoinGecko coin id mapping
pub fn default_coin_ids() -> HashMap<String, String> {
    [
        ("BTC", "bitcoin"),
        ("ETH", "ethereum"),
        ("SOL", "solana"),
        ("BNB", "binancecoin"),
    ]
    .iter()
    .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
    .collect()
}

/// One coin in a `simple/price` response
#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
}

/// CoinGecko `simple/price` connector; one batched request per cycle
pub struct CoinGeckoConnector {
    api_url: String,
    client: Client,
    coin_ids: HashMap<String, String>,
    limiter: RateLimiter,
}

impl CoinGeckoConnector {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_url: api_url.into(),
            client: Client::builder().timeout(timeout).build()?,
            coin_ids: default_coin_ids(),
            limiter: RateLimiter::per_minute(SOURCE_ID, 50),
        })
    }

    /// Add or replace coin id mappings
    pub fn with_coin_ids(mut self, coin_ids: HashMap<String, String>) -> Self {
        self.coin_ids.extend(coin_ids);
        self
    }

    async fn fetch_simple_prices(&self, ids: &[&str]) -> Result<HashMap<String, SimplePrice>> {
        self.limiter.acquire().await;

        let url = format!("{}/simple/price", self.api_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("ids", ids.join(",")),
                ("vs_currencies", "usd".to_string()),
                ("include_24hr_change", "true".to_string()),
            ])
            .send()
            .await
            .context("CoinGecko request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("CoinGecko API error: {}", response.status()));
        }

        response
            .json()
            .await
            .context("Failed to decode CoinGecko response")
    }
}

/// Turn a `simple/price` body into one reading per requested symbol
fn parse_prices(
    asset_ids: &[String],
    coin_ids: &HashMap<String, String>,
    prices: &HashMap<String, SimplePrice>,
) -> Vec<QuoteResult> {
    asset_ids
        .iter()
        .map(|asset| -> QuoteResult {
            let coin_id = coin_ids
                .get(asset)
                .ok_or_else(|| SourceFailure::new(SOURCE_ID, asset.as_str(), "no coin id mapping"))?;
            let entry = prices
                .get(coin_id)
                .ok_or_else(|| SourceFailure::new(SOURCE_ID, asset.as_str(), format!("{} missing from response", coin_id)))?;
            let price = entry
                .usd
                .ok_or_else(|| SourceFailure::new(SOURCE_ID, asset.as_str(), "no usd price"))?;

            let mut quote = Quote::new(SOURCE_ID, asset.as_str(), price);
            if let Some(change) = entry.usd_24h_change {
                quote = quote.with_change(change);
            }
            Ok(quote)
        })
        .collect()
}

#[async_trait::async_trait]
impl QuoteProvider for CoinGeckoConnector {
    fn name(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch_quotes(&self, asset_ids: &[String]) -> Result<Vec<QuoteResult>> {
        let ids: Vec<&str> = asset_ids
            .iter()
            .filter_map(|asset| self.coin_ids.get(asset).map(String::as_str))
            .collect();

        let prices = if ids.is_empty() {
            HashMap::new()
        } else {
            self.fetch_simple_prices(&ids).await?
        };

        let quotes = parse_prices(asset_ids, &self.coin_ids, &prices);
        debug!(requested = asset_ids.len(), returned = prices.len(), "CoinGecko prices parsed");
        info!("✅ Fetched {} CoinGecko prices", quotes.iter().filter(|q| q.is_ok()).count());
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_simple_price_body() {
        let body = r#"{
            "bitcoin": {"usd": 60000.5, "usd_24h_change": -2.13},
            "solana": {"usd": 150.2, "usd_24h_change": 4.02}
        }"#;
        let prices: HashMap<String, SimplePrice> = serde_json::from_str(body).unwrap();
        let quotes = parse_prices(&assets(&["BTC", "SOL", "ETH", "DOGE"]), &default_coin_ids(), &prices);

        let btc = quotes[0].as_ref().unwrap();
        assert_eq!(btc.asset_id, "BTC");
        assert_eq!(btc.source_id, "coingecko");
        assert_eq!(btc.price, 60000.5);
        assert_eq!(btc.change_24h_pct, Some(-2.13));

        assert_eq!(quotes[1].as_ref().unwrap().price, 150.2);

        let eth = quotes[2].as_ref().unwrap_err();
        assert!(eth.reason.contains("ethereum missing"));
        let doge = quotes[3].as_ref().unwrap_err();
        assert_eq!(doge.reason, "no coin id mapping");
    }

    #[test]
    fn test_missing_change_still_quotes() {
        let body = r#"{"ethereum": {"usd": 3000.0}}"#;
        let prices: HashMap<String, SimplePrice> = serde_json::from_str(body).unwrap();
        let quotes = parse_prices(&assets(&["ETH"]), &default_coin_ids(), &prices);
        assert_eq!(quotes[0].as_ref().unwrap().change_24h_pct, None);
    }

    #[test]
    fn test_custom_coin_ids_extend_defaults() {
        let connector = CoinGeckoConnector::new(COINGECKO_API, Duration::from_secs(10))
            .unwrap()
            .with_coin_ids(HashMap::from([("DOGE".to_string(), "dogecoin".to_string())]));
        assert_eq!(connector.coin_ids.get("DOGE").map(String::as_str), Some("dogecoin"));
        assert_eq!(connector.coin_ids.get("BTC").map(String::as_str), Some("bitcoin"));
    }
}
