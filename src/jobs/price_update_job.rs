use chrono::Utc;
use tracing::{info, warn};

use crate::db::price_queries;
use crate::errors::AppError;
use crate::external::market_data::Quote;
use crate::services::job_scheduler_service::{JobContext, JobResult};

/// Refresh USD quotes for all tracked assets and store one tick per asset.
pub async fn update_prices(ctx: JobContext) -> Result<JobResult, AppError> {
    let symbols = &ctx.settings.symbols;
    if symbols.is_empty() {
        info!("no tracked symbols, skipping price update");
        return Ok(JobResult {
            items_processed: 0,
            items_failed: 0,
        });
    }

    let quotes = ctx.market_data.fetch_quotes(symbols).await?;

    let (valid, rejected): (Vec<Quote>, Vec<Quote>) =
        quotes.into_iter().partition(is_valid_quote);

    for quote in &rejected {
        warn!(symbol = %quote.symbol, price_usd = quote.price_usd, "rejected invalid quote");
    }
    let missing = symbols.len().saturating_sub(valid.len() + rejected.len());
    if missing > 0 {
        warn!(missing, "provider returned no quote for some tracked symbols");
    }

    price_queries::insert_ticks(&ctx.pool, &valid, Utc::now()).await?;

    info!(
        stored = valid.len(),
        rejected = rejected.len(),
        missing,
        "price update completed"
    );

    Ok(JobResult {
        items_processed: valid.len() as i32,
        items_failed: (rejected.len() + missing) as i32,
    })
}

fn is_valid_quote(quote: &Quote) -> bool {
    quote.price_usd.is_finite() && quote.price_usd > 0.0
}
