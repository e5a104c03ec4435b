//! Macroeconomic indicator agent

use super::{cite_all, format_contexts, SOURCE_TYPE_KEY};
use crate::llm::TextGenerator;
use crate::models::{Citation, RetrievedContext, SourceType};
use crate::providers::{detect_series, MacroDataProvider};
use crate::Result;
use std::sync::Arc;
use tracing::warn;

pub const NO_MACRO_DATA: &str =
    "No relevant economic data found. Try asking about GDP, unemployment, inflation, or interest rates.";

const SYSTEM_PROMPT: &str = r#"You are a macroeconomic analyst. Analyze economic indicators from FRED.

Rules:
1. Report exact values and dates
2. Explain trends and implications
3. Compare to historical averages when relevant
4. Note data limitations"#;

const SERIES_RELEVANCE: f64 = 0.9;

pub struct MacroAgent {
    model: Arc<dyn TextGenerator>,
    provider: Arc<dyn MacroDataProvider>,
}

impl MacroAgent {
    pub fn new(model: Arc<dyn TextGenerator>, provider: Arc<dyn MacroDataProvider>) -> Self {
        Self { model, provider }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedContext>> {
        let mut contexts = Vec::new();

        for series_id in detect_series(query) {
            match self.provider.latest(series_id).await {
                Ok(Some(snapshot)) => contexts.push(
                    RetrievedContext::new(
                        format!("FRED-{}", series_id),
                        snapshot.render(),
                        SERIES_RELEVANCE,
                    )
                    .with_metadata("series_id", series_id)
                    .with_metadata(SOURCE_TYPE_KEY, SourceType::MacroData.as_str()),
                ),
                Ok(None) => {}
                Err(e) => warn!(series_id, error = %e, "Macro series unavailable"),
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
            return Ok((NO_MACRO_DATA.to_string(), Vec::new()));
        }

        let prompt = format!(
            "Question: {}\n\nEconomic Data:\n{}\n\nAnalyze this data to answer the question.",
            query,
            format_contexts(contexts)
        );

        let response = self.model.generate(&prompt, Some(SYSTEM_PROMPT), 0.3).await?;

        Ok((response.content, cite_all(SourceType::MacroData, contexts)))
    }
}
