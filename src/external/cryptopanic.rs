use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::external::market_data::{FetchedArticle, NewsProvider, ProviderError};

pub struct CryptoPanicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CryptoPanicProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CpResponse {
    results: Vec<CpPost>,
}

#[derive(Debug, Deserialize)]
struct CpPost {
    title: String,
    url: String,
    published_at: Option<DateTime<Utc>>,
    source: Option<CpSource>,
}

#[derive(Debug, Deserialize)]
struct CpSource {
    title: String,
}

fn parse_posts(body: CpResponse) -> Vec<FetchedArticle> {
    body.results
        .into_iter()
        .map(|post| FetchedArticle {
            title: post.title,
            source: post
                .source
                .map(|s| s.title)
                .unwrap_or_else(|| "unknown".to_string()),
            url: post.url,
            published_at: post.published_at,
        })
        .collect()
}

#[async_trait]
impl NewsProvider for CryptoPanicProvider {
    async fn fetch_latest(
        &self,
        currencies: &[String],
    ) -> Result<Vec<FetchedArticle>, ProviderError> {
        let url = format!("{}/posts/", self.base_url);
        let currencies = currencies.join(",");

        let mut request = self
            .client
            .get(&url)
            .query(&[("kind", "news"), ("currencies", currencies.as_str())]);

        if let Some(key) = &self.api_key {
            request = request.query(&[("auth_token", key.as_str())]);
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
                "cryptopanic returned status {}",
                resp.status()
            )));
        }

        let body = resp
            .json::<CpResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_posts(body))
    }
}
