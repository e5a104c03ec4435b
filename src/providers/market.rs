//! HTTP-backed market data provider
//!
//! Calls the financial data service configured by `FINANCIAL_API_BASE_URL`.

use super::{MarketDataProvider, MarketFacet};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct HttpMarketData {
    client: Client,
    base_url: String,
}

impl HttpMarketData {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::Provider(format!(
                    "Financial API request failed for {}: {}",
                    path, e
                ))
            })?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| OrchestrationError::Provider(format!("Invalid JSON response: {}", e)))?;

        if !status.is_success() {
            return Err(OrchestrationError::Provider(format!(
                "Financial API returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketData {
    async fn fetch(&self, ticker: &str, facet: MarketFacet) -> Result<Option<String>> {
        let path = format!("/api/v1/market/{}", facet.as_str());
        let body = self.post_json(&path, &json!({ "ticker": ticker })).await?;

        let data = body.get("data").unwrap_or(&body);
        let rendered = render_facet(ticker, facet, data);

        debug!(ticker, facet = %facet, has_data = rendered.is_some(), "Market facet fetched");

        Ok(rendered)
    }
}

/// Render a facet payload as `label: value` lines under a titled header.
fn render_facet(ticker: &str, facet: MarketFacet, data: &Value) -> Option<String> {
    let object = data.as_object()?;

    let lines: Vec<String> = object
        .iter()
        .filter_map(|(key, value)| render_value(value).map(|v| format!("{}: {}", key, v)))
        .collect();

    if lines.is_empty() {
        return None;
    }

    Some(format!(
        "=== {} {} ===\n{}",
        ticker,
        facet.title(),
        lines.join("\n")
    ))
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
        ),
        other => Some(other.to_string()),
    }
}
