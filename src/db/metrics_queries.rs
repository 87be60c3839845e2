use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::NetworkSample;

pub async fn fetch_latest_sample(pool: &PgPool) -> Result<Option<NetworkSample>, sqlx::Error> {
    sqlx::query_as::<_, NetworkSample>(
        "SELECT latest_block, block_timestamp, block_time_secs, gas_price_wei, collected_at
         FROM network_samples
         ORDER BY collected_at DESC
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await
}

pub async fn insert_sample(
    pool: &PgPool,
    latest_block: i64,
    block_timestamp: i64,
    block_time_secs: Option<f64>,
    gas_price_wei: Option<&str>,
    collected_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO network_samples
             (id, latest_block, block_timestamp, block_time_secs, gas_price_wei, collected_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(latest_block)
    .bind(block_timestamp)
    .bind(block_time_secs)
    .bind(gas_price_wei)
    .bind(collected_at)
    .execute(pool)
    .await?;

    Ok(())
}
