//! FRED macroeconomic series client

use super::{MacroDataProvider, SeriesSnapshot};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const FRED_BASE_URL: &str = "https://api.stlouisfed.org";

/// Latest observation plus the one before it.
const OBSERVATION_LIMIT: &str = "2";

pub struct FredClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl FredClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: FRED_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

#[async_trait]
impl MacroDataProvider for FredClient {
    async fn latest(&self, series_id: &str) -> Result<Option<SeriesSnapshot>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };

        let url = format!("{}/fred/series/observations", self.base_url);

        let response = self
            .client
            .get(url)
            .query(&[
                ("series_id", series_id),
                ("api_key", api_key),
                ("file_type", "json"),
                ("sort_order", "desc"),
                ("limit", OBSERVATION_LIMIT),
            ])
            .send()
            .await
            .map_err(|e| OrchestrationError::Provider(format!("FRED request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(OrchestrationError::Provider(format!(
                "FRED returned {} for {}",
                response.status(),
                series_id
            )));
        }

        let body: ObservationsResponse = response
            .json()
            .await
            .map_err(|e| OrchestrationError::Provider(format!("Invalid FRED response: {}", e)))?;

        // Missing observations are reported as "."
        let mut values = body
            .observations
            .iter()
            .filter_map(|o| o.value.parse::<f64>().ok().map(|v| (o.date.clone(), v)));

        let Some((date, latest)) = values.next() else {
            return Ok(None);
        };
        let previous = values.next().map(|(_, v)| v).unwrap_or(latest);

        debug!(series_id, latest, "FRED series fetched");

        Ok(Some(SeriesSnapshot {
            series_id: series_id.to_string(),
            latest,
            previous,
            date,
        }))
    }
}
