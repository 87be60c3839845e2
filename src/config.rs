use std::time::Duration;

use regex::Regex;

use crate::errors::AppError;

/// Runtime settings for the data-collection service, read from the
/// environment once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub http_port: u16,

    /// CoinGecko asset ids tracked by the price job (e.g. "bitcoin").
    pub symbols: Vec<String>,
    /// Currency codes used to filter the news feed (e.g. "BTC").
    pub news_currencies: Vec<String>,

    pub price_update_interval: Duration,
    pub news_update_interval: Duration,
    pub portfolio_update_interval: Duration,
    pub network_update_interval: Duration,

    pub job_max_retries: u32,
    pub job_retry_delay: Duration,

    pub coingecko_base_url: String,
    pub coingecko_api_key: Option<String>,
    pub cryptopanic_base_url: String,
    pub cryptopanic_api_key: Option<String>,
    pub starknet_rpc_url: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL not set".to_string()))?;

        let symbols = parse_list(&env_or("TRACKED_SYMBOLS", "bitcoin,ethereum,starknet"));
        for symbol in &symbols {
            if !is_valid_asset_id(symbol) {
                return Err(AppError::Config(format!(
                    "invalid entry in TRACKED_SYMBOLS: {symbol}"
                )));
            }
        }

        let news_currencies = parse_list(&env_or("NEWS_CURRENCIES", "BTC,ETH,STRK"));

        Ok(Self {
            database_url,
            http_port: parse_env("HTTP_PORT", 3000)?,
            symbols,
            news_currencies,
            price_update_interval: interval_from_env("PRICE_UPDATE_INTERVAL", 300)?,
            news_update_interval: interval_from_env("NEWS_UPDATE_INTERVAL", 1800)?,
            portfolio_update_interval: interval_from_env("PORTFOLIO_UPDATE_INTERVAL", 600)?,
            network_update_interval: interval_from_env("NETWORK_UPDATE_INTERVAL", 300)?,
            job_max_retries: parse_env("JOB_MAX_RETRIES", 3)?,
            job_retry_delay: interval_from_env("JOB_RETRY_DELAY_SECS", 5)?,
            coingecko_base_url: env_or("COINGECKO_BASE_URL", "https://api.coingecko.com/api/v3"),
            coingecko_api_key: std::env::var("COINGECKO_API_KEY").ok(),
            cryptopanic_base_url: env_or("CRYPTOPANIC_BASE_URL", "https://cryptopanic.com/api/v1"),
            cryptopanic_api_key: std::env::var("CRYPTOPANIC_API_KEY").ok(),
            starknet_rpc_url: env_or(
                "STARKNET_RPC_URL",
                "https://starknet-mainnet.public.blastapi.io/rpc/v0_7",
            ),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

fn interval_from_env(key: &str, default_secs: u64) -> Result<Duration, AppError> {
    let secs: u64 = parse_env(key, default_secs)?;
    if secs == 0 {
        return Err(AppError::Config(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}

/// Split a comma-separated list, trimming whitespace and dropping empties.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// CoinGecko asset ids are lowercase slugs ("bitcoin", "usd-coin").
pub fn is_valid_asset_id(symbol: &str) -> bool {
    // Compiled per call; only runs during startup validation.
    let re = Regex::new(r"^[a-z0-9][a-z0-9-]{0,49}$").expect("asset id pattern is valid");
    re.is_match(symbol)
}
