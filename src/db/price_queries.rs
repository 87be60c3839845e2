use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::external::market_data::Quote;
use crate::models::LatestPrice;

pub async fn insert_ticks(
    pool: &PgPool,
    quotes: &[Quote],
    collected_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for quote in quotes {
        sqlx::query(
            "INSERT INTO price_ticks (id, symbol, price_usd, market_cap_usd, change_24h_pct, collected_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(&quote.symbol)
        .bind(quote.price_usd)
        .bind(quote.market_cap_usd)
        .bind(quote.change_24h_pct)
        .bind(collected_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Latest stored tick per symbol.
pub async fn fetch_latest_prices(pool: &PgPool) -> Result<Vec<LatestPrice>, sqlx::Error> {
    sqlx::query_as::<_, LatestPrice>(
        "SELECT DISTINCT ON (symbol) symbol, price_usd, collected_at
         FROM price_ticks
         ORDER BY symbol, collected_at DESC",
    )
    .fetch_all(pool)
    .await
}
