//! LLM-backed decomposer
//!
//! Prompts the model for a JSON task plan, parses it strictly into
//! [`TaskPlan`], then validates and sanitizes it.

use super::{sanitize_plan, validate_plan, Decomposer};
use crate::error::OrchestrationError;
use crate::llm::TextGenerator;
use crate::models::TaskPlan;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

pub struct LlmDecomposer {
    model: Arc<dyn TextGenerator>,
}

impl LlmDecomposer {
    pub fn new(model: Arc<dyn TextGenerator>) -> Self {
        Self { model }
    }

    fn build_prompt(query: &str) -> String {
        format!(
            r#"You are a financial query analyzer. Break this complex query into executable subtasks.

Available agents:
- openbb: Stock prices, P/E ratios, financial metrics, market data (requires ticker symbol)
- sec: SEC filings, risk factors, 10-K/10-Q data, regulatory documents (requires ticker symbol)
- fred: GDP, inflation, unemployment, interest rates, macroeconomic indicators (no ticker needed)
- synthesis: Combine and analyze results from multiple agents (depends on other tasks)

Rules for task decomposition:
1. Create tasks that can run INDEPENDENTLY when possible
2. Only add dependencies (depends_on) when task truly needs results from another task
3. Always add a synthesis task if query needs multiple data sources combined
4. Keep task queries specific and actionable
5. Extract ticker symbols from original query
6. Avoid unnecessary sequential dependencies

Query: {}

Output valid JSON in this exact format:
{{
  "tasks": [
    {{"id": "t1", "type": "openbb", "query": "Get AAPL P/E ratio", "ticker": "AAPL", "depends_on": []}},
    {{"id": "t2", "type": "fred", "query": "Get current GDP growth rate", "depends_on": []}},
    {{"id": "t3", "type": "synthesis", "query": "Compare AAPL P/E ratio to GDP growth", "depends_on": ["t1", "t2"]}}
  ],
  "reasoning": "Need both financial metric (P/E) and macro data (GDP), then compare",
  "can_parallelize": true
}}

Generate task plan:"#,
            query
        )
    }
}

#[async_trait]
impl Decomposer for LlmDecomposer {
    async fn decompose(&self, query: &str) -> Result<TaskPlan> {
        info!(query, "Decomposing query");

        let prompt = Self::build_prompt(query);

        let response = self
            .model
            .generate(&prompt, None, 0.3)
            .await
            .map_err(|e| {
                OrchestrationError::Decomposition(format!("Failed to decompose query: {}", e))
            })?;

        let plan = parse_plan(&response.content).map_err(|e| {
            error!(error = %e, raw = %response.content, "Task plan rejected");
            e
        })?;

        let plan = sanitize_plan(plan);

        info!(
            task_count = plan.tasks.len(),
            can_parallelize = plan.can_parallelize,
            "Query decomposed"
        );

        Ok(plan)
    }
}

/// Locate the JSON payload in a model reply: a ```json fenced block if
/// present, otherwise the span from the first `{` to the last `}`.
pub fn extract_json(content: &str) -> Option<&str> {
    if let Some(start) = content.find("```json") {
        let body = &content[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        return Some(body[..end].trim());
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Strictly parse and validate a task plan. Sanitization is left to the caller.
pub fn parse_plan(content: &str) -> Result<TaskPlan> {
    let json = extract_json(content).ok_or_else(|| {
        OrchestrationError::Decomposition("No JSON found in response".to_string())
    })?;

    let plan: TaskPlan = serde_json::from_str(json).map_err(|e| {
        OrchestrationError::Decomposition(format!("Failed to parse task plan: {}", e))
    })?;

    validate_plan(&plan)?;
    Ok(plan)
}
