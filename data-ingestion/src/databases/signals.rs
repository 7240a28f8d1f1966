use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use signal_generation::{ConsensusResult, SignalEvent, SignalStore, TradeSignal, VerdictSummary};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Row summary of a stored signal
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSignal {
    pub id: Uuid,
    pub asset_id: String,
    pub score: i64,
    pub entry_price: f64,
    pub created_at: DateTime<Utc>,
}

/// SQLite persistence for price checks, anomaly checks and signals
pub struct SqliteSignalStore {
    pool: SqlitePool,
}

impl SqliteSignalStore {
    /// Open (creating if needed) the database at `url` and make sure the tables exist
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url {}", url))?
            .create_if_missing(true);

        // in-memory databases are per connection
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open {}", url))?;

        info!("✅ Connected to SQLite at {}", url);

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_checks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id TEXT NOT NULL,
                consensus_price REAL NOT NULL,
                deviation_pct REAL NOT NULL,
                change_24h_pct REAL,
                valid_quotes INTEGER NOT NULL,
                status TEXT NOT NULL,
                checked_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS anomaly_checks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                is_anomaly INTEGER NOT NULL,
                green_assets TEXT NOT NULL,
                red_assets TEXT NOT NULL,
                total_assets INTEGER NOT NULL,
                observed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                asset_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                score INTEGER NOT NULL,
                reasons TEXT NOT NULL,
                entry_price REAL NOT NULL,
                stop_price REAL NOT NULL,
                take_profit_price REAL NOT NULL,
                size REAL NOT NULL,
                risk_amount REAL NOT NULL,
                article_count INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("✅ Initialized signal tables");

        Ok(())
    }

    async fn insert_price_check(&self, check: &ConsensusResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_checks (asset_id, consensus_price, deviation_pct, change_24h_pct, valid_quotes, status, checked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&check.asset_id)
        .bind(check.consensus_price)
        .bind(check.max_pairwise_deviation_pct)
        .bind(check.change_24h_pct)
        .bind(check.valid_quotes as i64)
        .bind(check.status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_anomaly_check(&self, verdict: &VerdictSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO anomaly_checks (is_anomaly, green_assets, red_assets, total_assets, observed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(verdict.is_anomaly)
        .bind(serde_json::to_string(&verdict.green_assets)?)
        .bind(serde_json::to_string(&verdict.red_assets)?)
        .bind(verdict.total_assets as i64)
        .bind(verdict.observed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_signal(&self, signal: &TradeSignal) -> Result<()> {
        let direction = format!("{:?}", signal.direction).to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO signals (id, asset_id, direction, score, reasons, entry_price, stop_price,
                                 take_profit_price, size, risk_amount, article_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(signal.id.to_string())
        .bind(signal.asset_id())
        .bind(direction)
        .bind(signal.score() as i64)
        .bind(serde_json::to_string(&signal.confidence.reasons)?)
        .bind(signal.plan.entry_price)
        .bind(signal.plan.stop_price)
        .bind(signal.plan.take_profit_price)
        .bind(signal.plan.size)
        .bind(signal.plan.risk_amount)
        .bind(signal.article_count.map(i64::from))
        .bind(signal.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn price_check_count(&self) -> Result<i64> {
        self.count("price_checks").await
    }

    pub async fn anomaly_check_count(&self) -> Result<i64> {
        self.count("anomaly_checks").await
    }

    pub async fn signal_count(&self) -> Result<i64> {
        self.count("signals").await
    }

    pub async fn latest_signal(&self) -> Result<Option<StoredSignal>> {
        let row = sqlx::query_as::<_, (String, String, i64, f64, DateTime<Utc>)>(
            r#"
            SELECT id, asset_id, score, entry_price, created_at
            FROM signals
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, asset_id, score, entry_price, created_at)| -> Result<StoredSignal> {
            Ok(StoredSignal {
                id: Uuid::parse_str(&id).with_context(|| format!("Corrupt signal id {}", id))?,
                asset_id,
                score,
                entry_price,
                created_at,
            })
        })
        .transpose()
    }
}

#[async_trait::async_trait]
impl SignalStore for SqliteSignalStore {
    async fn record(&self, event: &SignalEvent) -> Result<()> {
        let stored = match event {
            SignalEvent::PriceCheck(check) => self.insert_price_check(check).await,
            SignalEvent::Verdict(verdict) => self.insert_anomaly_check(verdict).await,
            SignalEvent::Signal(signal) => self.insert_signal(signal).await,
        };
        stored.with_context(|| format!("Failed to store {} event", event.kind()))?;

        debug!(kind = event.kind(), "Event stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Candidate, Quote};
    use portfolio_risk::size_position;
    use signal_generation::{reconcile, ConfidenceResult};

    fn signal() -> TradeSignal {
        TradeSignal::new(
            Candidate {
                asset_id: "SOL".to_string(),
                change_pct: 4.2,
                price: 150.0,
            },
            ConfidenceResult {
                score: 65,
                reasons: vec!["Strong green performance (+4.20%)".to_string()],
            },
            size_position(150.0, 0.05, 3.0, 1000.0, 0.02).unwrap(),
            vec!["BTC".to_string(), "ETH".to_string(), "BNB".to_string()],
            Some(7),
        )
    }

    #[tokio::test]
    async fn test_records_every_event_kind() {
        let store = SqliteSignalStore::connect("sqlite::memory:").await.unwrap();

        let check = reconcile(
            "SOL",
            &[
                Ok(Quote::new("coingecko", "SOL", 150.0).with_change(4.2)),
                Ok(Quote::new("kucoin", "SOL", 150.3).with_change(4.1)),
            ],
            1.0,
        );
        let verdict = VerdictSummary {
            is_anomaly: true,
            green_assets: vec!["SOL".to_string()],
            red_assets: vec!["BTC".to_string(), "ETH".to_string(), "BNB".to_string()],
            total_assets: 4,
            observed_at: Utc::now(),
        };
        let signal = signal();

        store.record(&SignalEvent::PriceCheck(check)).await.unwrap();
        store.record(&SignalEvent::Verdict(verdict)).await.unwrap();
        store.record(&SignalEvent::Signal(signal.clone())).await.unwrap();

        assert_eq!(store.price_check_count().await.unwrap(), 1);
        assert_eq!(store.anomaly_check_count().await.unwrap(), 1);
        assert_eq!(store.signal_count().await.unwrap(), 1);

        let stored = store.latest_signal().await.unwrap().unwrap();
        assert_eq!(stored.id, signal.id);
        assert_eq!(stored.asset_id, "SOL");
        assert_eq!(stored.score, 65);
        assert_eq!(stored.entry_price, 150.0);
    }

    #[tokio::test]
    async fn test_duplicate_signal_is_an_error() {
        let store = SqliteSignalStore::connect("sqlite::memory:").await.unwrap();
        let signal = signal();

        store.record(&SignalEvent::Signal(signal.clone())).await.unwrap();
        assert!(store.record(&SignalEvent::Signal(signal)).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_store_has_no_latest_signal() {
        let store = SqliteSignalStore::connect("sqlite::memory:").await.unwrap();
        assert!(store.latest_signal().await.unwrap().is_none());
        assert_eq!(store.signal_count().await.unwrap(), 0);
    }
}
