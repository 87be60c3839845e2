use chrono::Utc;
use tracing::info;

use crate::db::metrics_queries;
use crate::errors::AppError;
use crate::services::job_scheduler_service::{JobContext, JobResult};

/// Sample the chain head and derive average block time against the previous
/// stored sample.
pub async fn monitor_network(ctx: JobContext) -> Result<JobResult, AppError> {
    let snapshot = ctx.network.fetch_snapshot().await?;
    let previous = metrics_queries::fetch_latest_sample(&ctx.pool).await?;

    let block_time_secs = previous.as_ref().and_then(|prev| {
        average_block_time(
            prev.latest_block,
            prev.block_timestamp,
            snapshot.latest_block as i64,
            snapshot.block_timestamp,
        )
    });

    metrics_queries::insert_sample(
        &ctx.pool,
        snapshot.latest_block as i64,
        snapshot.block_timestamp,
        block_time_secs,
        snapshot.gas_price_wei.as_deref(),
        Utc::now(),
    )
    .await?;

    info!(
        latest_block = snapshot.latest_block,
        block_time_secs,
        "network sample stored"
    );

    Ok(JobResult {
        items_processed: 1,
        items_failed: 0,
    })
}

/// Seconds per block between two samples. None when the head has not
/// advanced or timestamps went backwards (node switched, reorg).
fn average_block_time(prev_block: i64, prev_ts: i64, block: i64, ts: i64) -> Option<f64> {
    let blocks = block - prev_block;
    let secs = ts - prev_ts;
    if blocks <= 0 || secs <= 0 {
        return None;
    }
    Some(secs as f64 / blocks as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_block_time() {
        assert_eq!(average_block_time(100, 1000, 110, 1300), Some(30.0));
        assert_eq!(average_block_time(100, 1000, 101, 1015), Some(15.0));
    }

    #[test]
    fn test_average_block_time_head_not_advanced() {
        assert_eq!(average_block_time(100, 1000, 100, 1300), None);
        assert_eq!(average_block_time(100, 1000, 99, 1300), None);
    }

    #[test]
    fn test_average_block_time_clock_went_backwards() {
        assert_eq!(average_block_time(100, 1000, 110, 900), None);
    }
}
