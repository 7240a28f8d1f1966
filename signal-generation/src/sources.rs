// Data Source Interfaces
// What the pipeline needs from the outside world before it can decide anything

use anyhow::Result;
use common::{NewsEvidence, QuoteBook};

/// Multi-provider quote source
///
/// Implementations query each provider at most once per asset per call and
/// own any rate limiting. Partial results are fine: assets missing from the
/// returned book are left out of the snapshot. An `Err` means nothing at all
/// could be fetched.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(&self, asset_ids: &[String]) -> Result<QuoteBook>;
}

/// News volume lookup for a single asset
#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn evidence(&self, asset_id: &str) -> Result<Option<NewsEvidence>>;
}
