use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Holding, Portfolio, PortfolioValuation};

pub async fn fetch_active_portfolios(pool: &PgPool) -> Result<Vec<Portfolio>, sqlx::Error> {
    sqlx::query_as::<_, Portfolio>(
        "SELECT id, name, is_active FROM portfolios WHERE is_active = TRUE ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

pub async fn fetch_holdings(
    pool: &PgPool,
    portfolio_id: Uuid,
) -> Result<Vec<Holding>, sqlx::Error> {
    sqlx::query_as::<_, Holding>(
        "SELECT id, portfolio_id, symbol, quantity
         FROM holdings
         WHERE portfolio_id = $1
         ORDER BY symbol",
    )
    .bind(portfolio_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_valuation(
    pool: &PgPool,
    valuation: &PortfolioValuation,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO portfolio_valuations
             (id, portfolio_id, total_value_usd, priced_assets, missing_prices, valued_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(valuation.portfolio_id)
    .bind(valuation.total_value_usd)
    .bind(valuation.priced_assets)
    .bind(valuation.missing_prices)
    .bind(valuation.valued_at)
    .execute(pool)
    .await?;

    Ok(())
}
