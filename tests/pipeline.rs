//! End-to-end pipeline scenarios against deterministic backends.

use financial_research_orchestrator::agent::filing::NO_FILING_DATA;
use financial_research_orchestrator::agent::CriticAgent;
use financial_research_orchestrator::config::Settings;
use financial_research_orchestrator::context::AppContext;
use financial_research_orchestrator::corpus::{FilingChunk, InMemoryCorpus};
use financial_research_orchestrator::execution::{AgentRegistry, TaskExecutor};
use financial_research_orchestrator::llm::ScriptedGenerator;
use financial_research_orchestrator::orchestrator::{Orchestrator, Route};
use financial_research_orchestrator::planner::{has_cycle, Decomposer, LlmDecomposer};
use financial_research_orchestrator::providers::{
    MarketFacet, SeriesSnapshot, StaticMacroData, StaticMarketData,
};
use financial_research_orchestrator::verification::{
    create_final_response, ResponseValidator, FAILED_RULE_CHECKS,
};
use financial_research_orchestrator::{
    AgentOutput, Citation, Intent, OrchestrationError, Query, RetrievedContext, SourceType, Task,
    TaskPlan, TaskStatus, TaskType,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const GOOD_VERDICT: &str =
    "FAITHFULNESS: 0.92\nCITATION_COVERAGE: 0.9\nUNSUPPORTED_CLAIMS: []\nPASSED: true";

const CLASSIFIER: &str = "Classify this query";
const CRITIC: &str = "validation agent";
const DECOMPOSER: &str = "financial query analyzer";
const SYNTHESIS: &str = "synthesis analyst";
const MACRO: &str = "macroeconomic analyst";

async fn context(model: Arc<ScriptedGenerator>) -> AppContext {
    let corpus = InMemoryCorpus::new();
    corpus
        .ingest(vec![
            FilingChunk::new(
                "AAPL-10K-2024-1",
                "Risk factors: the company depends on outsourcing partners located in Asia.",
            )
            .with_metadata("ticker", "AAPL"),
            FilingChunk::new(
                "MSFT-10K-2024-1",
                "Risk factors: cybersecurity incidents could harm the company's cloud business.",
            )
            .with_metadata("ticker", "MSFT"),
        ])
        .await;

    let market = StaticMarketData::new()
        .with("AAPL", MarketFacet::Metrics, "P/E Ratio: 29.40\nEV/EBITDA: 22.10")
        .with("MSFT", MarketFacet::Metrics, "P/E Ratio: 35.10\nEV/EBITDA: 24.80");

    let macro_data = StaticMacroData::new().with(SeriesSnapshot {
        series_id: "FEDFUNDS".into(),
        latest: 5.33,
        previous: 5.33,
        date: "2024-06-01".into(),
    });

    AppContext::new(
        Settings::default(),
        model,
        Arc::new(corpus),
        Arc::new(market),
        Arc::new(macro_data),
    )
}

#[tokio::test]
async fn single_financial_query_takes_simple_path() {
    let model = Arc::new(
        ScriptedGenerator::new()
            .on(CLASSIFIER, "FINANCIALS")
            .on(CRITIC, GOOD_VERDICT)
            .with_default("AAPL trades at a P/E ratio of 29.40 [Source 1]."),
    );
    let orchestrator = Orchestrator::new(&context(model).await);

    let outcome = orchestrator
        .run(Query::new("What is Apple's P/E ratio?").with_ticker("AAPL"))
        .await
        .unwrap();

    assert_eq!(outcome.intent, Intent::Financials);
    assert!(!outcome.complexity.is_complex);
    assert_eq!(outcome.route, Route::Simple(TaskType::Market));
    assert!(outcome.task_plan.is_none());

    let response = &outcome.response;
    assert!(response.response.contains("AAPL"));
    assert!(response.response.contains("29.40"));
    assert!(!response.citations.is_empty());
    assert_eq!(response.citations[0].source_type, SourceType::FinancialData);
    assert!(!response.needs_human_review);
}

#[tokio::test]
async fn cross_domain_comparison_is_decomposed_and_synthesized() {
    let plan = r#"Here is the plan:
```json
{
  "tasks": [
    {"id": "t1", "type": "openbb", "query": "Get AAPL P/E ratio", "ticker": "AAPL", "depends_on": []},
    {"id": "t2", "type": "openbb", "query": "Get MSFT P/E ratio", "ticker": "MSFT", "depends_on": []},
    {"id": "t3", "type": "fred", "query": "Current interest rate level", "depends_on": []},
    {"id": "t4", "type": "synthesis", "query": "", "depends_on": ["t1", "t2", "t3"]}
  ],
  "reasoning": "Two valuation lookups and the policy rate, then compare",
  "can_parallelize": true
}
```"#;
    let synthesis =
        "MSFT trades at 35.1x against AAPL at 29.4x [Source 1][Source 2], with rates at 5.33% [Source 3].";

    let model = Arc::new(
        ScriptedGenerator::new()
            .on(CLASSIFIER, "SYNTHESIS")
            .on(CRITIC, GOOD_VERDICT)
            .on(DECOMPOSER, plan)
            .on(SYNTHESIS, synthesis)
            .with_default("Lookup summary."),
    );
    let orchestrator = Orchestrator::new(&context(model.clone()).await);

    let query = "Compare AAPL and MSFT P/E ratios and explain impact of Fed rate hikes";
    let outcome = orchestrator.run(Query::new(query)).await.unwrap();

    assert!(outcome.complexity.is_complex);
    assert_eq!(outcome.route, Route::MultiTask);

    let plan = outcome.task_plan.as_ref().unwrap();
    assert!(plan.tasks.len() >= 3);
    let synthesis_task = plan
        .tasks
        .iter()
        .find(|t| t.task_type == TaskType::Synthesis)
        .unwrap();
    assert!(synthesis_task.depends_on.contains(&"t1".to_string()));
    assert!(synthesis_task.depends_on.contains(&"t2".to_string()));

    assert_eq!(outcome.task_results.len(), 4);
    assert_eq!(outcome.task_results.last().unwrap().task_id, "t4");
    assert!(outcome.task_results.iter().all(|r| r.succeeded()));

    assert_eq!(outcome.response.response, synthesis);
    assert_eq!(
        outcome.response.agents_used,
        vec!["openbb_agent", "fred_agent", "synthesis_agent"]
    );

    let cited: HashSet<&str> = outcome
        .response
        .citations
        .iter()
        .map(|c| c.source_id.as_str())
        .collect();
    let expected: HashSet<&str> = ["openbb-metrics-AAPL", "openbb-metrics-MSFT", "FRED-FEDFUNDS"]
        .into_iter()
        .collect();
    assert_eq!(cited, expected);
    assert!(!outcome.response.needs_human_review);

    // the empty synthesis query falls back to the user's query
    let synthesis_prompt = model
        .prompts()
        .into_iter()
        .find(|p| p.contains("Available Data:"))
        .unwrap();
    assert!(synthesis_prompt.contains(query));
}

#[tokio::test]
async fn unknown_ticker_reports_no_filing_data() {
    let model = Arc::new(
        ScriptedGenerator::new()
            .on(CLASSIFIER, "SEC_FILING")
            .on(CRITIC, GOOD_VERDICT),
    );
    let orchestrator = Orchestrator::new(&context(model).await);

    let outcome = orchestrator
        .run(Query::new("What are ZZZZ's risk factors?").with_ticker("ZZZZ"))
        .await
        .unwrap();

    assert_eq!(outcome.route, Route::Simple(TaskType::Filing));
    assert!(outcome.response.response.contains(NO_FILING_DATA));
    assert!(outcome.response.citations.is_empty());
    assert_eq!(outcome.response.confidence_score, 0.0);
    assert!(outcome.response.needs_human_review);
}

#[tokio::test]
async fn malformed_plan_fails_the_query_without_retry() {
    let model = Arc::new(
        ScriptedGenerator::new()
            .on(CLASSIFIER, "FINANCIALS")
            .on(DECOMPOSER, "Sorry, I cannot break this query down."),
    );
    let orchestrator = Orchestrator::new(&context(model.clone()).await);

    let err = assert_err!(
        orchestrator
            .run(Query::new("Compare AAPL and MSFT P/E ratios").with_conversation("conv-bad"))
            .await
    );

    assert!(matches!(err, OrchestrationError::Decomposition(_)));

    let decompositions = model
        .prompts()
        .iter()
        .filter(|p| p.contains(DECOMPOSER))
        .count();
    assert_eq!(decompositions, 1);

    let history = orchestrator.state_store().history("conv-bad").await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn cyclic_plan_is_repaired() {
    let cyclic = r#"{
  "tasks": [
    {"id": "t1", "type": "market", "query": "AAPL valuation", "ticker": "AAPL", "depends_on": ["t2"]},
    {"id": "t2", "type": "market", "query": "MSFT valuation", "ticker": "MSFT", "depends_on": ["t1"]},
    {"id": "t3", "type": "synthesis", "query": "Compare", "depends_on": []}
  ],
  "reasoning": "circular"
}"#;
    let model = Arc::new(ScriptedGenerator::new().with_default(cyclic));
    let decomposer = LlmDecomposer::new(model);

    let plan = assert_ok!(decomposer.decompose("Compare AAPL and MSFT").await);

    assert!(!has_cycle(&plan.tasks));
    assert!(plan
        .tasks
        .iter()
        .filter(|t| t.task_type != TaskType::Synthesis)
        .all(|t| t.depends_on.is_empty()));

    let synthesis = plan.tasks.iter().find(|t| t.id == "t3").unwrap();
    assert_eq!(synthesis.depends_on, vec!["t1", "t2"]);
}

#[tokio::test]
async fn fabricated_citation_flags_response_for_review() {
    let model = Arc::new(ScriptedGenerator::new().with_default(GOOD_VERDICT));
    let validator = ResponseValidator::new(CriticAgent::new(model.clone()), 0.8, 0.7);

    let context = RetrievedContext::new("AAPL-10K-2024-1", "Outsourcing partners in Asia.", 0.9);
    let output = AgentOutput {
        agent_name: "sec_rag_agent".into(),
        response_text: "Apple depends on partners in Asia [Source 1] and on FAKE data.".into(),
        citations: vec![
            Citation::from_context(SourceType::SecFiling, &context),
            Citation {
                source_type: SourceType::SecFiling,
                source_id: "FAKE-1".into(),
                text_excerpt: "made up".into(),
                relevance_score: 0.99,
            },
        ],
        retrieved_contexts: vec![context],
        confidence_score: 0.95,
        processing_time_ms: 3,
    };

    let outcome = validator.validate(&output).await.unwrap();

    assert!(!outcome.passed);
    assert_eq!(outcome.critic.unsupported_claims, vec![FAILED_RULE_CHECKS]);
    assert_eq!(model.call_count(), 0);

    let response = create_final_response("risks?", &output, vec!["sec_rag_agent".into()], &outcome);
    assert!(response.needs_human_review);
}

#[tokio::test]
async fn failed_task_does_not_drop_siblings() {
    let model = Arc::new(
        ScriptedGenerator::new()
            .fail_on(MACRO, "model overloaded")
            .on(SYNTHESIS, "Partial view: AAPL at 29.4x, macro data missing.")
            .with_default("AAPL trades at 29.4x [Source 1]."),
    );
    let ctx = context(model).await;
    let registry = Arc::new(AgentRegistry::standard(
        ctx.model.clone(),
        ctx.corpus.clone(),
        ctx.market.clone(),
        ctx.macro_data.clone(),
        ctx.settings.retrieval_top_k,
    ));
    let executor = TaskExecutor::new(registry);

    let plan = TaskPlan {
        tasks: vec![
            Task::new("t1", TaskType::Market, "AAPL P/E ratio").with_ticker("AAPL"),
            Task::new("t2", TaskType::Macro, "Current interest rate level"),
            Task::new("t3", TaskType::Synthesis, "Valuation versus rates").depending_on(&["t1", "t2"]),
        ],
        reasoning: "lookups then synthesis".into(),
        can_parallelize: true,
    };

    let results = executor.execute_plan(&plan, "AAPL valuation versus rates").await;

    assert_eq!(results.len(), 3);
    let by_id = |id: &str| results.iter().find(|r| r.task_id == id).unwrap();

    assert_eq!(by_id("t1").status, TaskStatus::Success);
    assert_eq!(by_id("t2").status, TaskStatus::Failed);
    assert!(by_id("t2").error.as_deref().unwrap().contains("model overloaded"));

    let synthesis = by_id("t3");
    assert!(synthesis.succeeded());
    assert!(synthesis
        .output
        .retrieved_contexts
        .iter()
        .any(|c| c.source_id == "task:t2"));
    assert!(synthesis
        .output
        .retrieved_contexts
        .iter()
        .any(|c| c.source_id == "openbb-metrics-AAPL"));

    // the error stub informs synthesis but is never cited as a source
    assert!(synthesis
        .output
        .citations
        .iter()
        .all(|c| c.source_id != "task:t2"));
    assert!(synthesis
        .output
        .citations
        .iter()
        .any(|c| c.source_id == "openbb-metrics-AAPL"));
}

#[tokio::test]
async fn conversation_lineage_is_kept_per_id() {
    let model = Arc::new(
        ScriptedGenerator::new()
            .on(CLASSIFIER, "MACRO")
            .on(CRITIC, GOOD_VERDICT)
            .with_default("The policy rate is 5.33% [Source 1]."),
    );
    let orchestrator = Orchestrator::new(&context(model).await);

    for text in ["What is the interest rate?", "Has the interest rate changed?"] {
        orchestrator
            .run(Query::new(text).with_conversation("conv-a"))
            .await
            .unwrap();
    }
    orchestrator
        .run(Query::new("What is the interest rate?").with_conversation("conv-b"))
        .await
        .unwrap();

    let store = orchestrator.state_store();
    let history = store.history("conv-a").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].query, "Has the interest rate changed?");
    assert_eq!(store.history("conv-b").await.unwrap().len(), 1);
}
