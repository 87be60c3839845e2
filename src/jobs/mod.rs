//! Background jobs executed by the job scheduler service.
//!
//! Each job is an async function taking a [`JobContext`] and returning a
//! [`JobResult`]; failures are handled by the scheduler's retry wrapper,
//! never by the job itself.
//!
//! - `price_update_job` - refreshes USD quotes for tracked assets
//! - `news_fetch_job` - pulls recent crypto news, deduped by URL
//! - `portfolio_valuation_job` - values active portfolios at latest prices
//! - `network_metrics_job` - samples StarkNet chain head metrics
//!
//! [`JobContext`]: crate::services::job_scheduler_service::JobContext
//! [`JobResult`]: crate::services::job_scheduler_service::JobResult

pub mod network_metrics_job;
pub mod news_fetch_job;
pub mod portfolio_valuation_job;
pub mod price_update_job;
