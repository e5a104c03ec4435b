//! Result aggregation for multi-task plans

use crate::models::{AgentOutput, RetrievedContext, TaskResult, TaskType};
use std::collections::HashSet;
use tracing::debug;

pub const ORCHESTRATOR_AGENT: &str = "orchestrator";
pub const NO_RESULTS: &str = "No results available.";

/// Collapse task results into one output.
///
/// A successful synthesis result is taken verbatim. Otherwise responses are
/// joined with blank lines in completion order, citations concatenated and
/// confidences averaged. The output carries the union of every task's
/// contexts so the validator can check citations against all evidence.
pub fn aggregate(results: &[TaskResult]) -> AgentOutput {
    let contexts = union_contexts(results);
    let processing_time_ms = results.iter().map(|r| r.output.processing_time_ms).sum();

    if results.is_empty() {
        return AgentOutput {
            agent_name: ORCHESTRATOR_AGENT.to_string(),
            response_text: NO_RESULTS.to_string(),
            citations: Vec::new(),
            retrieved_contexts: contexts,
            confidence_score: 0.0,
            processing_time_ms,
        };
    }

    if let Some(synthesis) = results
        .iter()
        .find(|r| r.task_type == TaskType::Synthesis && r.succeeded())
    {
        debug!(task_id = %synthesis.task_id, "Using synthesis result as final response");
        return AgentOutput {
            agent_name: ORCHESTRATOR_AGENT.to_string(),
            response_text: synthesis.output.response_text.clone(),
            citations: synthesis.output.citations.clone(),
            retrieved_contexts: contexts,
            confidence_score: synthesis.output.confidence_score,
            processing_time_ms,
        };
    }

    debug!(task_count = results.len(), "No synthesis result, combining task outputs");

    let response_text = results
        .iter()
        .map(|r| r.output.response_text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let citations = results
        .iter()
        .flat_map(|r| r.output.citations.iter().cloned())
        .collect();
    let confidence_score =
        results.iter().map(|r| r.output.confidence_score).sum::<f64>() / results.len() as f64;

    AgentOutput {
        agent_name: ORCHESTRATOR_AGENT.to_string(),
        response_text,
        citations,
        retrieved_contexts: contexts,
        confidence_score,
        processing_time_ms,
    }
}

/// Distinct agent names that produced the results, in first-use order.
pub fn agents_used(results: &[TaskResult]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for result in results {
        if !names.contains(&result.output.agent_name) {
            names.push(result.output.agent_name.clone());
        }
    }
    names
}

fn union_contexts(results: &[TaskResult]) -> Vec<RetrievedContext> {
    let mut seen = HashSet::new();
    results
        .iter()
        .flat_map(|r| r.output.retrieved_contexts.iter())
        .filter(|c| seen.insert(c.source_id.clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Citation, SourceType, TaskStatus};

    fn result(id: &str, task_type: TaskType, text: &str, confidence: f64) -> TaskResult {
        let ctx = RetrievedContext::new(format!("src-{}", id), text, 0.9);
        TaskResult {
            task_id: id.into(),
            task_type,
            status: TaskStatus::Success,
            output: AgentOutput {
                agent_name: format!("{}_agent", task_type),
                response_text: text.into(),
                citations: vec![Citation::from_context(SourceType::FinancialData, &ctx)],
                retrieved_contexts: vec![ctx],
                confidence_score: confidence,
                processing_time_ms: 10,
            },
            error: None,
        }
    }

    #[test]
    fn test_empty_results() {
        let output = aggregate(&[]);
        assert_eq!(output.response_text, NO_RESULTS);
        assert_eq!(output.confidence_score, 0.0);
        assert!(output.citations.is_empty());
    }

    #[test]
    fn test_synthesis_wins_verbatim() {
        let results = vec![
            result("t1", TaskType::Market, "AAPL P/E 29", 0.9),
            result("t2", TaskType::Market, "MSFT P/E 35", 0.8),
            result("t3", TaskType::Synthesis, "AAPL is cheaper.", 0.7),
        ];
        let output = aggregate(&results);

        assert_eq!(output.response_text, "AAPL is cheaper.");
        assert_eq!(output.confidence_score, 0.7);
        assert_eq!(output.citations.len(), 1);
        assert_eq!(output.retrieved_contexts.len(), 3);
        assert_eq!(output.agent_name, ORCHESTRATOR_AGENT);
    }

    #[test]
    fn test_failed_synthesis_falls_back_to_naive_merge() {
        let mut synthesis = result("t3", TaskType::Synthesis, "Error: boom", 0.0);
        synthesis.status = TaskStatus::Failed;
        synthesis.output.citations.clear();

        let results = vec![
            result("t1", TaskType::Market, "first", 0.9),
            result("t2", TaskType::Macro, "second", 0.6),
            synthesis,
        ];
        let output = aggregate(&results);

        assert_eq!(output.response_text, "first\n\nsecond\n\nError: boom");
        assert_eq!(output.citations.len(), 2);
        assert!((output.confidence_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_agents_used_deduplicates() {
        let results = vec![
            result("t1", TaskType::Market, "a", 0.9),
            result("t2", TaskType::Market, "b", 0.9),
            result("t3", TaskType::Synthesis, "c", 0.9),
        ];
        assert_eq!(agents_used(&results), vec!["market_agent", "synthesis_agent"]);
    }
}
