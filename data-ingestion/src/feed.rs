// Multi-provider market feed
// Queries every quote provider once per cycle and groups the readings by asset

use anyhow::{bail, Result};
use common::{QuoteBook, QuoteResult, SourceFailure};
use futures_util::future::join_all;
use signal_generation::MarketDataSource;
use std::sync::Arc;
use tracing::{info, warn};

/// A single price provider
#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One reading per requested asset where possible; `Err` if the provider is unreachable
    async fn fetch_quotes(&self, asset_ids: &[String]) -> Result<Vec<QuoteResult>>;
}

/// Fans a fetch out to all providers concurrently
pub struct MultiSourceFeed {
    providers: Vec<Arc<dyn QuoteProvider>>,
}

impl MultiSourceFeed {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn QuoteProvider>) -> Self {
        info!("Adding quote provider: {}", provider.name());
        self.providers.push(provider);
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

impl Default for MultiSourceFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge per-provider outcomes into a book keyed by requested asset
///
/// Every requested asset gets exactly one reading per provider: its quote, or a
/// failure when the provider was down or skipped the asset. Returns `None`
/// when no provider produced a single quote.
fn merge(
    asset_ids: &[String],
    outcomes: Vec<(String, Result<Vec<QuoteResult>>)>,
) -> Option<QuoteBook> {
    let mut book: QuoteBook = asset_ids
        .iter()
        .map(|asset| (asset.clone(), Vec::new()))
        .collect();
    let mut any_quote = false;

    for (provider, outcome) in outcomes {
        match outcome {
            Ok(mut readings) => {
                any_quote |= readings.iter().any(|r| r.is_ok());

                for asset in asset_ids {
                    let position = readings.iter().position(|r| match r {
                        Ok(quote) => &quote.asset_id == asset,
                        Err(failure) => &failure.asset_id == asset,
                    });
                    let reading = match position {
                        Some(index) => readings.swap_remove(index),
                        None => Err(SourceFailure::new(provider.as_str(), asset.as_str(), "no reading returned")),
                    };
                    if let Some(entry) = book.get_mut(asset) {
                        entry.push(reading);
                    }
                }
            }
            Err(e) => {
                warn!(provider = %provider, "Provider failed: {:#}", e);
                for (asset, readings) in book.iter_mut() {
                    readings.push(Err(SourceFailure::new(provider.as_str(), asset.as_str(), e.to_string())));
                }
            }
        }
    }

    any_quote.then_some(book)
}

#[async_trait::async_trait]
impl MarketDataSource for MultiSourceFeed {
    async fn fetch(&self, asset_ids: &[String]) -> Result<QuoteBook> {
        if self.providers.is_empty() {
            bail!("no quote providers configured");
        }

        let outcomes = join_all(self.providers.iter().map(|provider| async move {
            (provider.name().to_string(), provider.fetch_quotes(asset_ids).await)
        }))
        .await;

        match merge(asset_ids, outcomes) {
            Some(book) => Ok(book),
            None => bail!("all {} quote providers failed", self.providers.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use common::Quote;

    struct FixedProvider {
        name: &'static str,
        readings: Vec<QuoteResult>,
    }

    #[async_trait::async_trait]
    impl QuoteProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_quotes(&self, _asset_ids: &[String]) -> Result<Vec<QuoteResult>> {
            Ok(self.readings.clone())
        }
    }

    struct DownProvider;

    #[async_trait::async_trait]
    impl QuoteProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn fetch_quotes(&self, _asset_ids: &[String]) -> Result<Vec<QuoteResult>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn assets() -> Vec<String> {
        vec!["BTC".to_string(), "SOL".to_string()]
    }

    #[tokio::test]
    async fn test_one_reading_per_provider_per_asset() {
        let feed = MultiSourceFeed::new()
            .with_provider(Arc::new(FixedProvider {
                name: "a",
                readings: vec![
                    Ok(Quote::new("a", "SOL", 150.0).with_change(4.0)),
                    Ok(Quote::new("a", "BTC", 60000.0).with_change(-2.0)),
                ],
            }))
            .with_provider(Arc::new(FixedProvider {
                name: "b",
                readings: vec![Ok(Quote::new("b", "BTC", 60010.0).with_change(-2.1))],
            }))
            .with_provider(Arc::new(DownProvider));

        let book = feed.fetch(&assets()).await.unwrap();

        let btc = &book["BTC"];
        assert_eq!(btc.len(), 3);
        assert_eq!(btc.iter().filter(|r| r.is_ok()).count(), 2);

        let sol = &book["SOL"];
        assert_eq!(sol.len(), 3);
        assert_eq!(sol[1].as_ref().unwrap_err().reason, "no reading returned");
        assert_eq!(sol[2].as_ref().unwrap_err().source_id, "down");
    }

    #[tokio::test]
    async fn test_fails_only_when_every_provider_fails() {
        let feed = MultiSourceFeed::new()
            .with_provider(Arc::new(DownProvider))
            .with_provider(Arc::new(FixedProvider {
                name: "empty",
                readings: vec![Err(SourceFailure::new("empty", "BTC", "404"))],
            }));

        assert!(feed.fetch(&assets()).await.is_err());
    }

    #[tokio::test]
    async fn test_no_providers_is_an_error() {
        assert!(MultiSourceFeed::new().fetch(&assets()).await.is_err());
    }
}
