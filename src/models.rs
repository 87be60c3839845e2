use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Latest stored price for a symbol, one row per symbol.
#[derive(Debug, Clone, FromRow)]
pub struct LatestPrice {
    pub symbol: String,
    pub price_usd: f64,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Portfolio {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct Holding {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub quantity: f64,
}

/// A point-in-time valuation of one portfolio.
#[derive(Debug, Clone)]
pub struct PortfolioValuation {
    pub portfolio_id: Uuid,
    pub total_value_usd: f64,
    pub priced_assets: i32,
    pub missing_prices: i32,
    pub valued_at: DateTime<Utc>,
}

/// One stored network sample.
#[derive(Debug, Clone, FromRow)]
pub struct NetworkSample {
    pub latest_block: i64,
    pub block_timestamp: i64,
    pub block_time_secs: Option<f64>,
    pub gas_price_wei: Option<String>,
    pub collected_at: DateTime<Utc>,
}
