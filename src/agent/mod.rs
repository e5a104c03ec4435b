//! Agent contract
//!
//! Every agent variant answers a query in two steps, retrieve then generate,
//! and [`Agent::execute`] wraps both into an [`AgentOutput`] with a confidence
//! score. Callers only ever use `execute`.

use crate::models::{
    AgentInput, AgentOutput, Citation, Filters, RetrievedContext, SourceType, UpstreamOutput,
};
use crate::Result;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info};

pub mod critic;
pub mod filing;
pub mod macro_data;
pub mod market;
pub mod synthesis;

pub use critic::CriticAgent;
pub use filing::FilingAgent;
pub use macro_data::MacroAgent;
pub use market::MarketAgent;
pub use synthesis::SynthesisAgent;

pub const SEC_RAG_AGENT: &str = "sec_rag_agent";
pub const OPENBB_AGENT: &str = "openbb_agent";
pub const FRED_AGENT: &str = "fred_agent";
pub const SYNTHESIS_AGENT: &str = "synthesis_agent";
pub const CRITIC_AGENT: &str = "critic_agent";

/// Metadata key recording which kind of source produced a context.
pub const SOURCE_TYPE_KEY: &str = "source_type";

/// Relevance given to an upstream answer that carried no contexts of its own.
const UPSTREAM_TEXT_RELEVANCE: f64 = 0.5;

/// Metadata flag on the stub context of a failed upstream task.
pub const UPSTREAM_FAILED_KEY: &str = "upstream_failed";

/// Task-dispatchable agent variants.
pub enum Agent {
    Filing(FilingAgent),
    Market(MarketAgent),
    Macro(MacroAgent),
    Synthesis(SynthesisAgent),
}

impl Agent {
    pub fn name(&self) -> &'static str {
        match self {
            Agent::Filing(_) => SEC_RAG_AGENT,
            Agent::Market(_) => OPENBB_AGENT,
            Agent::Macro(_) => FRED_AGENT,
            Agent::Synthesis(_) => SYNTHESIS_AGENT,
        }
    }

    pub async fn retrieve(&self, query: &str, filters: &Filters) -> Result<Vec<RetrievedContext>> {
        match self {
            Agent::Filing(agent) => agent.retrieve(query, filters).await,
            Agent::Market(agent) => agent.retrieve(query, filters).await,
            Agent::Macro(agent) => agent.retrieve(query).await,
            Agent::Synthesis(_) => Ok(Vec::new()),
        }
    }

    pub async fn generate(
        &self,
        query: &str,
        contexts: &[RetrievedContext],
    ) -> Result<(String, Vec<Citation>)> {
        match self {
            Agent::Filing(agent) => agent.generate(query, contexts).await,
            Agent::Market(agent) => agent.generate(query, contexts).await,
            Agent::Macro(agent) => agent.generate(query, contexts).await,
            Agent::Synthesis(agent) => agent.generate(query, contexts).await,
        }
    }

    /// Retrieve, merge any upstream evidence, generate, and score.
    pub async fn execute(&self, input: &AgentInput) -> Result<AgentOutput> {
        let start = Instant::now();

        let mut contexts = self.retrieve(&input.query, &input.filters).await?;
        merge_contexts(&mut contexts, upstream_contexts(&input.upstream));

        debug!(agent = self.name(), context_count = contexts.len(), "Retrieval complete");

        let (response_text, citations) = self.generate(&input.query, &contexts).await?;
        let confidence = calculate_confidence(&contexts, &citations);
        let processing_time_ms = start.elapsed().as_millis() as u64;

        info!(
            agent = self.name(),
            confidence,
            citation_count = citations.len(),
            context_count = contexts.len(),
            processing_time_ms,
            "Agent execution complete"
        );

        Ok(AgentOutput {
            agent_name: self.name().to_string(),
            response_text,
            citations,
            retrieved_contexts: contexts,
            confidence_score: confidence,
            processing_time_ms,
        })
    }
}

/// `0.6 * mean relevance + 0.4 * min(citations / contexts, 1)`, rounded to
/// three decimals; zero without contexts.
pub fn calculate_confidence(contexts: &[RetrievedContext], citations: &[Citation]) -> f64 {
    if contexts.is_empty() {
        return 0.0;
    }

    let avg_relevance =
        contexts.iter().map(|c| c.relevance_score.clamp(0.0, 1.0)).sum::<f64>() / contexts.len() as f64;
    let citation_ratio = (citations.len() as f64 / contexts.len() as f64).min(1.0);

    let score = avg_relevance * 0.6 + citation_ratio * 0.4;
    ((score * 1000.0).round() / 1000.0).clamp(0.0, 1.0)
}

/// Numbered source list embedded in generation prompts.
pub fn format_contexts(contexts: &[RetrievedContext]) -> String {
    if contexts.is_empty() {
        return "No relevant context found.".to_string();
    }

    contexts
        .iter()
        .enumerate()
        .map(|(i, ctx)| format!("[Source {}] ({}):\n{}\n", i + 1, ctx.source_id, ctx.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One citation per context, using the given source type.
pub fn cite_all(source_type: SourceType, contexts: &[RetrievedContext]) -> Vec<Citation> {
    contexts
        .iter()
        .map(|ctx| Citation::from_context(source_type, ctx))
        .collect()
}

/// Evidence handed down from upstream tasks. An upstream answer without
/// contexts (including an error stub) is passed on as a context of its own.
/// Error stubs are flagged with [`UPSTREAM_FAILED_KEY`].
fn upstream_contexts(upstream: &[UpstreamOutput]) -> Vec<RetrievedContext> {
    upstream
        .iter()
        .flat_map(|up| {
            if up.output.retrieved_contexts.is_empty() {
                let stub = RetrievedContext::new(
                    format!("task:{}", up.task_id),
                    up.output.response_text.clone(),
                    UPSTREAM_TEXT_RELEVANCE,
                )
                .with_metadata("task_id", up.task_id.clone());
                if up.failed {
                    vec![stub.with_metadata(UPSTREAM_FAILED_KEY, true)]
                } else {
                    vec![stub]
                }
            } else {
                up.output.retrieved_contexts.clone()
            }
        })
        .collect()
}

/// Append contexts whose source id is not present yet.
fn merge_contexts(contexts: &mut Vec<RetrievedContext>, extra: Vec<RetrievedContext>) {
    let mut seen: HashSet<String> = contexts.iter().map(|c| c.source_id.clone()).collect();
    for ctx in extra {
        if seen.insert(ctx.source_id.clone()) {
            contexts.push(ctx);
        }
    }
}
