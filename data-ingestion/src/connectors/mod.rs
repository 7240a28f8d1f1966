pub mod coingecko;
pub mod cryptopanic;
pub mod kucoin;
pub mod rate_limit;

pub use coingecko::CoinGeckoConnector;
pub use cryptopanic::CryptoPanicNews;
pub use kucoin::KuCoinConnector;
pub use rate_limit::RateLimiter;
