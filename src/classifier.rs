//! Intent Classifier
//!
//! One generation call per query, mapped onto the closed [`Intent`] set.
//! Anything the model says outside that set falls back to the filing intent.

use crate::llm::TextGenerator;
use crate::models::Intent;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct IntentClassifier {
    model: Arc<dyn TextGenerator>,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn TextGenerator>) -> Self {
        Self { model }
    }

    pub async fn classify(&self, query: &str) -> Result<Intent> {
        let prompt = build_prompt(query);
        let response = self.model.generate(&prompt, None, 0.1).await?;
        let intent = parse_intent(&response.content);

        debug!(raw = %response.content.trim(), intent = %intent, "Intent classified");

        Ok(intent)
    }
}

fn build_prompt(query: &str) -> String {
    format!(
        r#"Classify this query into one category:
- SEC_FILING: Questions about company filings, 10-K, 10-Q, risk factors
- FINANCIALS: Stock prices, ratios, earnings, metrics
- MACRO: GDP, unemployment, inflation, interest rates
- SYNTHESIS: Needs multiple data sources

Query: {}

Respond with just the category name."#,
        query
    )
}

/// Map a raw model reply onto an intent. Exact label match after trimming and
/// upper-casing; anything else is [`Intent::SecFiling`].
pub fn parse_intent(raw: &str) -> Intent {
    let label = raw.trim().to_uppercase();
    Intent::from_label(&label).unwrap_or_else(|| {
        warn!(raw = %raw.trim(), "Unrecognised intent label, defaulting to SEC_FILING");
        Intent::SecFiling
    })
}
