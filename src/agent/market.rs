//! Market data and fundamentals agent

use super::{cite_all, format_contexts, SOURCE_TYPE_KEY};
use crate::complexity::extract_tickers;
use crate::llm::TextGenerator;
use crate::models::{Citation, Filters, RetrievedContext, SourceType};
use crate::providers::{MarketDataProvider, MarketFacet};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub const NO_MARKET_DATA: &str =
    "Unable to retrieve financial data. Please specify a valid ticker symbol (e.g., AAPL, MSFT, GOOGL).";

const SYSTEM_PROMPT: &str = r#"You are a financial data analyst with access to comprehensive market data.

Rules:
1. Report exact numbers from the data provided
2. Always cite the data source (quote, fundamentals, estimates, etc.)
3. Explain what metrics mean in context
4. Compare to industry benchmarks when available
5. Note the data freshness and any limitations
6. For valuation questions, use multiple metrics (P/E, P/S, EV/EBITDA)
7. For growth analysis, compare YoY and sequential changes"#;

pub struct MarketAgent {
    model: Arc<dyn TextGenerator>,
    provider: Arc<dyn MarketDataProvider>,
}

impl MarketAgent {
    pub fn new(model: Arc<dyn TextGenerator>, provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { model, provider }
    }

    pub async fn retrieve(&self, query: &str, filters: &Filters) -> Result<Vec<RetrievedContext>> {
        let ticker = filters
            .get("ticker")
            .and_then(Value::as_str)
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .or_else(|| extract_tickers(query).into_iter().next());

        let Some(ticker) = ticker else {
            return Ok(Vec::new());
        };

        let mut contexts = Vec::new();

        for facet in MarketFacet::detect(query) {
            match self.provider.fetch(&ticker, facet).await {
                Ok(Some(text)) => contexts.push(
                    RetrievedContext::new(
                        format!("openbb-{}-{}", facet, ticker),
                        text,
                        facet.relevance(),
                    )
                    .with_metadata("type", facet.as_str())
                    .with_metadata("ticker", ticker.clone())
                    .with_metadata(SOURCE_TYPE_KEY, SourceType::FinancialData.as_str()),
                ),
                Ok(None) => {}
                Err(e) => {
                    warn!(ticker = %ticker, facet = %facet, error = %e, "Market facet unavailable");
                }
            }
        }

        Ok(contexts)
    }

    pub async fn generate(
        &self,
        query: &str,
        contexts: &[RetrievedContext],
    ) -> Result<(String, Vec<Citation>)> {
        if contexts.is_empty() {
            return Ok((NO_MARKET_DATA.to_string(), Vec::new()));
        }

        let prompt = format!(
            "Question: {}\n\nFinancial Data:\n{}\n\nProvide a comprehensive analysis answering the question. Include specific numbers and cite the data sources.",
            query,
            format_contexts(contexts)
        );

        let response = self.model.generate(&prompt, Some(SYSTEM_PROMPT), 0.3).await?;

        Ok((response.content, cite_all(SourceType::FinancialData, contexts)))
    }
}
