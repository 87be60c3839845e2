use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::external::market_data::{MarketDataProvider, ProviderError, Quote};

pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

// /simple/price returns a map keyed by asset id:
// { "bitcoin": { "usd": 64000.0, "usd_market_cap": 1.2e12, "usd_24h_change": -1.3 } }
#[derive(Debug, Deserialize)]
struct CgEntry {
    usd: Option<f64>,
    usd_market_cap: Option<f64>,
    usd_24h_change: Option<f64>,
}

fn parse_quotes(body: HashMap<String, CgEntry>) -> Vec<Quote> {
    let mut out: Vec<Quote> = body
        .into_iter()
        .filter_map(|(symbol, entry)| {
            // Entries without a USD price are assets the API doesn't quote.
            entry.usd.map(|price_usd| Quote {
                symbol,
                price_usd,
                market_cap_usd: entry.usd_market_cap,
                change_24h_pct: entry.usd_24h_change,
            })
        })
        .collect();
    out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    out
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, ProviderError> {
        let url = format!("{}/simple/price", self.base_url);
        let ids = symbols.join(",");

        let mut request = self.client.get(&url).query(&[
            ("ids", ids.as_str()),
            ("vs_currencies", "usd"),
            ("include_market_cap", "true"),
            ("include_24hr_change", "true"),
        ]);

        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(ProviderError::BadResponse(format!(
                "coingecko returned status {}",
                resp.status()
            )));
        }

        let body = resp
            .json::<HashMap<String, CgEntry>>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_quotes(body))
    }
}
