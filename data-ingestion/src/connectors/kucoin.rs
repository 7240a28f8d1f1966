use anyhow::{anyhow, Context, Result};
use common::{Quote, QuoteResult, SourceFailure};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::rate_limit::RateLimiter;
use crate::feed::QuoteProvider;

pub const KUCOIN_API: &str = "https://api.kucoin.com";
const SOURCE_ID: &str = "kucoin";
const SUCCESS_CODE: &str = "200000";

/// KuCoin response envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<MarketStats>,
}

/// 24h stats for one symbol; KuCoin sends numbers as strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketStats {
    last: Option<String>,
    change_rate: Option<String>,
}

/// KuCoin `market/stats` connector; one request per asset against the USDT pair
pub struct KuCoinConnector {
    api_url: String,
    client: Client,
    limiter: RateLimiter,
}

impl KuCoinConnector {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_url: api_url.into(),
            client: Client::builder().timeout(timeout).build()?,
            limiter: RateLimiter::per_second(SOURCE_ID, 10),
        })
    }

    pub fn symbol(asset_id: &str) -> String {
        format!("{}-USDT", asset_id)
    }

    async fn fetch_stats(&self, asset_id: &str) -> Result<Envelope> {
        self.limiter.acquire().await;

        let url = format!("{}/api/v1/market/stats", self.api_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", Self::symbol(asset_id))])
            .send()
            .await
            .context("KuCoin request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("KuCoin API error: {}", response.status()));
        }

        response.json().await.context("Failed to decode KuCoin response")
    }
}

fn parse_stats(asset_id: &str, envelope: Envelope) -> QuoteResult {
    let fail = |reason: String| SourceFailure::new(SOURCE_ID, asset_id, reason);

    if envelope.code != SUCCESS_CODE {
        return Err(fail(format!(
            "code {}: {}",
            envelope.code,
            envelope.msg.unwrap_or_default()
        )));
    }

    let stats = envelope.data.ok_or_else(|| fail("empty data".to_string()))?;
    let price = stats
        .last
        .as_deref()
        .ok_or_else(|| fail("no last price".to_string()))?
        .parse::<f64>()
        .map_err(|e| fail(format!("bad last price: {}", e)))?;

    let mut quote = Quote::new(SOURCE_ID, asset_id, price);
    if let Some(rate) = stats.change_rate.as_deref().and_then(|r| r.parse::<f64>().ok()) {
        quote = quote.with_change(rate * 100.0);
    }
    Ok(quote)
}

#[async_trait::async_trait]
impl QuoteProvider for KuCoinConnector {
    fn name(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch_quotes(&self, asset_ids: &[String]) -> Result<Vec<QuoteResult>> {
        let mut quotes = Vec::with_capacity(asset_ids.len());

        for asset_id in asset_ids {
            let quote = match self.fetch_stats(asset_id).await {
                Ok(envelope) => parse_stats(asset_id, envelope),
                Err(e) => {
                    warn!(asset = %asset_id, "KuCoin stats unavailable: {:#}", e);
                    Err(SourceFailure::new(SOURCE_ID, asset_id.as_str(), e.to_string()))
                }
            };
            quotes.push(quote);
        }

        debug!(
            requested = asset_ids.len(),
            ok = quotes.iter().filter(|q| q.is_ok()).count(),
            "KuCoin stats fetched"
        );
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(body: &str) -> Envelope {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_symbol() {
        assert_eq!(KuCoinConnector::symbol("SOL"), "SOL-USDT");
    }

    #[test]
    fn test_parse_stats() {
        let body = r#"{
            "code": "200000",
            "data": {"symbol": "SOL-USDT", "last": "150.25", "changeRate": "0.0402", "vol": "1000"}
        }"#;
        let quote = parse_stats("SOL", envelope(body)).unwrap();

        assert_eq!(quote.source_id, "kucoin");
        assert_eq!(quote.price, 150.25);
        assert!((quote.change_24h_pct.unwrap() - 4.02).abs() < 1e-9);
    }

    #[test]
    fn test_error_code_is_failure() {
        let body = r#"{"code": "400100", "msg": "symbol not exists", "data": null}"#;
        let failure = parse_stats("XYZ", envelope(body)).unwrap_err();
        assert_eq!(failure.asset_id, "XYZ");
        assert_eq!(failure.reason, "code 400100: symbol not exists");
    }

    #[test]
    fn test_unparseable_price_is_failure() {
        let body = r#"{"code": "200000", "data": {"last": "n/a", "changeRate": "0.01"}}"#;
        assert!(parse_stats("BTC", envelope(body)).is_err());

        let body = r#"{"code": "200000", "data": {"last": null}}"#;
        assert!(parse_stats("BTC", envelope(body)).is_err());
    }
}
