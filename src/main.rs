mod app;
mod config;
mod db;
mod errors;
mod external;
mod jobs;
mod logging;
mod models;
mod routes;
mod services;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use crate::config::Settings;
use crate::external::coingecko::CoinGeckoProvider;
use crate::external::cryptopanic::CryptoPanicProvider;
use crate::external::market_data::{MarketDataProvider, NetworkProvider, NewsProvider};
use crate::external::starknet::StarknetRpcProvider;
use crate::logging::LoggingConfig;
use crate::services::job_scheduler_service::{JobContext, JobSchedulerService, RetryPolicy};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    logging::init_logging(LoggingConfig::from_env());

    let settings = Arc::new(Settings::from_env()?);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;

    let market_data: Arc<dyn MarketDataProvider> = Arc::new(CoinGeckoProvider::new(
        settings.coingecko_base_url.clone(),
        settings.coingecko_api_key.clone(),
    ));
    let news: Arc<dyn NewsProvider> = Arc::new(CryptoPanicProvider::new(
        settings.cryptopanic_base_url.clone(),
        settings.cryptopanic_api_key.clone(),
    ));
    let network: Arc<dyn NetworkProvider> =
        Arc::new(StarknetRpcProvider::new(settings.starknet_rpc_url.clone()));

    let context = JobContext {
        pool: pool.clone(),
        market_data,
        news,
        network,
        settings: settings.clone(),
    };

    let scheduler = Arc::new(JobSchedulerService::new().await?);
    let policy = RetryPolicy {
        max_retries: settings.job_max_retries,
        retry_delay: settings.job_retry_delay,
    };

    let ctx = context.clone();
    scheduler
        .register_with_policy(
            "update_prices",
            settings.price_update_interval,
            policy,
            move || jobs::price_update_job::update_prices(ctx.clone()),
        )
        .await?;

    let ctx = context.clone();
    scheduler
        .register_with_policy(
            "fetch_news",
            settings.news_update_interval,
            policy,
            move || jobs::news_fetch_job::fetch_news(ctx.clone()),
        )
        .await?;

    let ctx = context.clone();
    scheduler
        .register_with_policy(
            "update_portfolio",
            settings.portfolio_update_interval,
            policy,
            move || jobs::portfolio_valuation_job::update_portfolio_values(ctx.clone()),
        )
        .await?;

    let ctx = context.clone();
    scheduler
        .register_with_policy(
            "monitor_starknet",
            settings.network_update_interval,
            policy,
            move || jobs::network_metrics_job::monitor_network(ctx.clone()),
        )
        .await?;

    scheduler.start().await?;

    let app = app::create_app(AppState {
        pool: pool.clone(),
        scheduler: scheduler.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.http_port));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🚀 chainpulse data service listening at http://{}/", addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "http server exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining jobs");
    scheduler.shutdown(true).await?;

    Ok(())
}
