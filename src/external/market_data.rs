use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A single USD quote for one tracked asset.
#[derive(Debug, Clone)]
pub struct Quote {
    pub symbol: String,
    pub price_usd: f64,
    pub market_cap_usd: Option<f64>,
    pub change_24h_pct: Option<f64>,
}

/// A news article as returned by a news feed, before storage.
#[derive(Debug, Clone)]
pub struct FetchedArticle {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Latest-block snapshot from a chain RPC node.
#[derive(Debug, Clone)]
pub struct NetworkSnapshot {
    pub latest_block: u64,
    pub block_timestamp: i64,
    pub gas_price_wei: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch current USD quotes for the given asset ids. Assets the provider
    /// does not know are silently absent from the result.
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, ProviderError>;
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Fetch the most recent news articles for the given currency codes.
    async fn fetch_latest(&self, currencies: &[String])
        -> Result<Vec<FetchedArticle>, ProviderError>;
}

#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Read the latest block from the node.
    async fn fetch_snapshot(&self) -> Result<NetworkSnapshot, ProviderError>;
}
