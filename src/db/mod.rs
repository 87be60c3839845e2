pub mod metrics_queries;
pub mod news_queries;
pub mod portfolio_queries;
pub mod price_queries;
