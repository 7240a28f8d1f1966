use anyhow::{anyhow, Context, Result};
use common::NewsEvidence;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::rate_limit::RateLimiter;
use signal_generation::NewsSource;

pub const CRYPTOPANIC_API: &str = "https://cryptopanic.com/api/v1";

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// CryptoPanic "rising" posts per currency
pub struct CryptoPanicNews {
    api_url: String,
    auth_token: String,
    client: Client,
    limiter: RateLimiter,
}

impl CryptoPanicNews {
    pub fn new(api_url: impl Into<String>, auth_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_url: api_url.into(),
            auth_token: auth_token.into(),
            client: Client::builder().timeout(timeout).build()?,
            limiter: RateLimiter::per_second("cryptopanic", 5),
        })
    }
}

fn evidence_from(response: PostsResponse) -> NewsEvidence {
    NewsEvidence {
        article_count: response.results.len() as u32,
    }
}

#[async_trait::async_trait]
impl NewsSource for CryptoPanicNews {
    async fn evidence(&self, asset_id: &str) -> Result<Option<NewsEvidence>> {
        self.limiter.acquire().await;

        let url = format!("{}/posts/", self.api_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("auth_token", self.auth_token.as_str()),
                ("currencies", asset_id),
                ("filter", "rising"),
            ])
            .send()
            .await
            .context("CryptoPanic request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("CryptoPanic API error: {}", response.status()));
        }

        let posts: PostsResponse = response
            .json()
            .await
            .context("Failed to decode CryptoPanic response")?;
        let evidence = evidence_from(posts);

        debug!(asset = asset_id, articles = evidence.article_count, "News fetched");
        Ok(Some(evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_count_is_result_count() {
        let body = r#"{
            "count": 120,
            "results": [
                {"title": "SOL breaks out", "kind": "news"},
                {"title": "Validators upgrade", "kind": "news"},
                {"title": "Ecosystem fund", "kind": "media"}
            ]
        }"#;
        let evidence = evidence_from(serde_json::from_str(body).unwrap());
        assert_eq!(evidence.article_count, 3);
    }

    #[test]
    fn test_missing_results_is_zero() {
        let evidence = evidence_from(serde_json::from_str(r#"{"count": 0}"#).unwrap());
        assert_eq!(evidence.article_count, 0);
    }
}
