//! Cross-source synthesis agent
//!
//! Retrieves nothing itself. Its contexts arrive from upstream tasks through
//! [`super::Agent::execute`].

use super::{format_contexts, SOURCE_TYPE_KEY, UPSTREAM_FAILED_KEY};
use crate::llm::TextGenerator;
use crate::models::{Citation, RetrievedContext, SourceType};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;

pub const NO_SYNTHESIS_DATA: &str = "No data available for synthesis.";

const SYSTEM_PROMPT: &str = r#"You are a synthesis analyst. Combine information from multiple data sources into a coherent analysis.

Rules:
1. Integrate SEC filing data, financial metrics, and macro indicators
2. Identify correlations and connections between data points
3. Cite all sources using [Source N] format
4. Highlight areas of uncertainty
5. Provide actionable insights"#;

pub struct SynthesisAgent {
    model: Arc<dyn TextGenerator>,
}

impl SynthesisAgent {
    pub fn new(model: Arc<dyn TextGenerator>) -> Self {
        Self { model }
    }

    pub async fn generate(
        &self,
        query: &str,
        contexts: &[RetrievedContext],
    ) -> Result<(String, Vec<Citation>)> {
        if contexts.is_empty() {
            return Ok((NO_SYNTHESIS_DATA.to_string(), Vec::new()));
        }

        let prompt = format!(
            "Question: {}\n\nAvailable Data:\n{}\n\nSynthesize this information into a comprehensive analysis. Cite sources.",
            query,
            format_contexts(contexts)
        );

        let response = self.model.generate(&prompt, Some(SYSTEM_PROMPT), 0.4).await?;

        // Error stubs from failed upstream tasks stay in the prompt but are never cited.
        let citations = contexts
            .iter()
            .filter(|ctx| !is_failed_upstream(ctx))
            .map(|ctx| Citation::from_context(source_type_of(ctx), ctx))
            .collect();

        Ok((response.content, citations))
    }
}

fn is_failed_upstream(ctx: &RetrievedContext) -> bool {
    ctx.metadata
        .get(UPSTREAM_FAILED_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn source_type_of(ctx: &RetrievedContext) -> SourceType {
    ctx.metadata
        .get(SOURCE_TYPE_KEY)
        .and_then(Value::as_str)
        .and_then(SourceType::from_tag)
        .unwrap_or(SourceType::SecFiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::llm::ScriptedGenerator;
    use crate::models::{AgentInput, AgentOutput, Filters, UpstreamOutput};

    fn upstream(task_id: &str, contexts: Vec<RetrievedContext>) -> UpstreamOutput {
        UpstreamOutput {
            task_id: task_id.into(),
            output: AgentOutput {
                agent_name: "openbb_agent".into(),
                response_text: format!("answer from {}", task_id),
                citations: Vec::new(),
                retrieved_contexts: contexts,
                confidence_score: 0.9,
                processing_time_ms: 3,
            },
            failed: false,
        }
    }

    #[tokio::test]
    async fn test_no_upstream_means_no_data() {
        let model = Arc::new(ScriptedGenerator::new());
        let agent = Agent::Synthesis(SynthesisAgent::new(model.clone()));

        let output = agent.execute(&AgentInput::new("compare", Filters::new())).await.unwrap();
        assert_eq!(output.response_text, NO_SYNTHESIS_DATA);
        assert_eq!(output.confidence_score, 0.0);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_citations_follow_upstream_source_types() {
        let model = Arc::new(ScriptedGenerator::new().on("Available Data:", "AAPL trades richer than MSFT."));
        let agent = Agent::Synthesis(SynthesisAgent::new(model.clone()));

        let aapl = RetrievedContext::new("openbb-metrics-AAPL", "P/E 29.4", 0.9)
            .with_metadata(SOURCE_TYPE_KEY, "financial_data");
        let msft = RetrievedContext::new("openbb-metrics-MSFT", "P/E 35.1", 0.9)
            .with_metadata(SOURCE_TYPE_KEY, "financial_data");

        let input = AgentInput::new("Compare AAPL and MSFT", Filters::new()).with_upstream(vec![
            upstream("t1", vec![aapl]),
            upstream("t2", vec![msft]),
            upstream("t3", Vec::new()),
        ]);

        let output = agent.execute(&input).await.unwrap();
        assert_eq!(output.agent_name, "synthesis_agent");
        assert_eq!(output.response_text, "AAPL trades richer than MSFT.");
        assert_eq!(output.citations.len(), 3);
        assert_eq!(output.citations[0].source_type, SourceType::FinancialData);
        // text-only upstream carries no source tag
        assert_eq!(output.citations[2].source_id, "task:t3");
        assert_eq!(output.citations[2].source_type, SourceType::SecFiling);

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("[Source 3] (task:t3):\nanswer from t3"));
    }

    #[tokio::test]
    async fn test_failed_upstream_is_not_cited() {
        let model = Arc::new(ScriptedGenerator::new().on("Available Data:", "AAPL P/E is 29.4."));
        let agent = Agent::Synthesis(SynthesisAgent::new(model.clone()));

        let aapl = RetrievedContext::new("openbb-metrics-AAPL", "P/E 29.4", 0.9)
            .with_metadata(SOURCE_TYPE_KEY, "financial_data");
        let failed = UpstreamOutput {
            task_id: "t2".into(),
            output: AgentOutput::failed("fred_agent", "FRED unavailable"),
            failed: true,
        };

        let input = AgentInput::new("AAPL valuation versus rates", Filters::new())
            .with_upstream(vec![upstream("t1", vec![aapl]), failed]);

        let output = agent.execute(&input).await.unwrap();
        assert_eq!(output.retrieved_contexts.len(), 2);
        assert_eq!(output.citations.len(), 1);
        assert_eq!(output.citations[0].source_id, "openbb-metrics-AAPL");
        assert!(output.citations.iter().all(|c| c.source_id != "task:t2"));

        // the failure is still visible to the model
        assert!(model.prompts()[0].contains("(task:t2):\nError: FRED unavailable"));
    }
}
