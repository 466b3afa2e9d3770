use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{SearchHit, SearchService};
use crate::error::{PressError, Result};

/// Search against a SearXNG-compatible JSON endpoint.
pub struct SearxClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    engine: String,
}

impl SearxClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SearchService for SearxClient {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(PressError::Status {
                service: "search".to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<SearxResponse>().await?;
        Ok(body
            .results
            .into_iter()
            .take(count)
            .map(|r| SearchHit {
                title: r.title,
                snippet: r.content,
                url: r.url,
                source: r.engine,
                enriched: false,
            })
            .collect())
    }
}
