use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Source of the text sent on each broadcast.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// One formatted message; an empty string means the provider had nothing.
    async fn fetch_quote(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    text: String,
    #[serde(rename = "byName", default)]
    by_name: String,
}

fn format_quote(quote: &QuoteResponse) -> String {
    if quote.text.trim().is_empty() {
        return String::new();
    }
    format!("{}\n\n- {}\n", quote.text, quote.by_name)
}

pub struct QuoteClient {
    client: reqwest::Client,
    endpoint: String,
}

impl QuoteClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl QuoteSource for QuoteClient {
    async fn fetch_quote(&self) -> Result<String> {
        debug!("Fetching quote from {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to quote provider")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Quote provider error ({}): {}", status, error_body.trim());
        }

        let quote: QuoteResponse = response
            .json()
            .await
            .context("Failed to parse quote provider response")?;

        Ok(format_quote(&quote))
    }
}
