use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::external::market_data::FetchedArticle;

/// Insert articles, skipping any URL already stored. Returns the number of
/// rows actually inserted.
pub async fn insert_articles(
    pool: &PgPool,
    articles: &[FetchedArticle],
    collected_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    let mut tx = pool.begin().await?;

    for article in articles {
        let result = sqlx::query(
            "INSERT INTO news_articles (id, title, source, url, published_at, collected_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(&article.title)
        .bind(&article.source)
        .bind(&article.url)
        .bind(article.published_at)
        .bind(collected_at)
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}
