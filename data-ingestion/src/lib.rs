// Market data, news, storage and delivery adapters for the anomaly hunter

pub mod config;
pub mod connectors;
pub mod databases;
pub mod feed;
pub mod notify;

pub use config::AppConfig;
pub use feed::{MultiSourceFeed, QuoteProvider};
