use chrono::Utc;
use tracing::info;

use crate::db::news_queries;
use crate::errors::AppError;
use crate::services::job_scheduler_service::{JobContext, JobResult};

/// Pull the latest news for the configured currencies. Articles already
/// stored (same URL) are skipped.
pub async fn fetch_news(ctx: JobContext) -> Result<JobResult, AppError> {
    let articles = ctx
        .news
        .fetch_latest(&ctx.settings.news_currencies)
        .await?;

    if articles.is_empty() {
        info!("news feed returned no articles");
        return Ok(JobResult {
            items_processed: 0,
            items_failed: 0,
        });
    }

    let inserted = news_queries::insert_articles(&ctx.pool, &articles, Utc::now()).await?;

    info!(
        fetched = articles.len(),
        inserted,
        "news fetch completed"
    );

    Ok(JobResult {
        items_processed: inserted as i32,
        items_failed: 0,
    })
}
