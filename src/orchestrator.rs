//! Main orchestrator - drives one query through the pipeline
//!
//! CLASSIFY → ROUTE → (AGENT | DECOMPOSE → EXECUTE → AGGREGATE) → VALIDATE → CHECKPOINT
//!
//! Every step reads an immutable [`StepContext`] and returns a [`StepOutput`];
//! only the driver writes to [`PipelineState`].

use crate::agent::CriticAgent;
use crate::aggregation::{aggregate, agents_used};
use crate::classifier::IntentClassifier;
use crate::complexity::{ComplexityDetector, ComplexityReport};
use crate::context::AppContext;
use crate::error::OrchestrationError;
use crate::execution::{AgentRegistry, TaskExecutor};
use crate::models::{
    AgentInput, AgentOutput, FinalResponse, Intent, Query, TaskPlan, TaskResult, TaskType,
};
use crate::planner::{Decomposer, LlmDecomposer};
use crate::state::{Checkpoint, InMemoryStateStore, StateStore};
use crate::verification::{create_final_response, ResponseValidator, ValidationOutcome};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Where a classified query goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// One agent answers directly.
    Simple(TaskType),
    /// Decompose, execute the plan, aggregate.
    MultiTask,
}

/// Routing decision for a classified query. Synthesis never has a
/// single-agent path.
pub fn route(intent: Intent, is_complex: bool) -> Route {
    if is_complex {
        return Route::MultiTask;
    }
    match intent {
        Intent::SecFiling => Route::Simple(TaskType::Filing),
        Intent::Financials => Route::Simple(TaskType::Market),
        Intent::Macro => Route::Simple(TaskType::Macro),
        Intent::Synthesis => Route::MultiTask,
    }
}

/// Read-only view handed to each step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub query: &'a Query,
    pub conversation_id: &'a str,
    pub intent: Option<Intent>,
}

impl<'a> StepContext<'a> {
    pub fn new(query: &'a Query, conversation_id: &'a str) -> Self {
        Self {
            query,
            conversation_id,
            intent: None,
        }
    }

    pub fn with_intent(self, intent: Intent) -> Self {
        Self {
            intent: Some(intent),
            ..self
        }
    }

    /// Intent set by the classify step. Every later step requires it.
    pub fn intent(&self) -> Result<Intent> {
        self.intent.ok_or_else(|| {
            OrchestrationError::Agent("Step requires a classified intent".to_string())
        })
    }
}

/// Result of one pipeline step.
pub enum StepOutput {
    Classified {
        intent: Intent,
        complexity: ComplexityReport,
        route: Route,
    },
    Answered {
        output: AgentOutput,
    },
    Executed {
        plan: TaskPlan,
        results: Vec<TaskResult>,
        output: AgentOutput,
    },
    Validated {
        outcome: ValidationOutcome,
    },
}

/// Accumulated pipeline state, written only by the driver.
#[derive(Default)]
pub struct PipelineState {
    pub intent: Option<Intent>,
    pub complexity: Option<ComplexityReport>,
    pub route: Option<Route>,
    pub plan: Option<TaskPlan>,
    pub task_results: Vec<TaskResult>,
    pub output: Option<AgentOutput>,
    pub validation: Option<ValidationOutcome>,
    pub reasoning_trace: Vec<String>,
}

impl PipelineState {
    pub fn apply(&mut self, step: StepOutput) {
        match step {
            StepOutput::Classified {
                intent,
                complexity,
                route,
            } => {
                self.reasoning_trace.push(format!(
                    "CLASSIFY: intent={} complex={} score={:.2}",
                    intent, complexity.is_complex, complexity.score
                ));
                self.intent = Some(intent);
                self.complexity = Some(complexity);
                self.route = Some(route);
            }
            StepOutput::Answered { output } => {
                self.reasoning_trace
                    .push(format!("AGENT: {} answered", output.agent_name));
                self.output = Some(output);
            }
            StepOutput::Executed {
                plan,
                results,
                output,
            } => {
                let failed = results.iter().filter(|r| !r.succeeded()).count();
                self.reasoning_trace.push(format!(
                    "EXECUTE: {} tasks, {} failed",
                    results.len(),
                    failed
                ));
                self.plan = Some(plan);
                self.task_results = results;
                self.output = Some(output);
            }
            StepOutput::Validated { outcome } => {
                self.reasoning_trace
                    .push(format!("VALIDATE: passed={}", outcome.passed));
                self.validation = Some(outcome);
            }
        }
    }
}

/// Everything the caller gets back for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationOutcome {
    pub conversation_id: String,
    pub response: FinalResponse,
    pub intent: Intent,
    pub complexity: ComplexityReport,
    pub route: Route,
    pub task_plan: Option<TaskPlan>,
    pub task_results: Vec<TaskResult>,
    pub reasoning_trace: Vec<String>,
    pub processing_time_ms: u64,
}

pub struct Orchestrator {
    classifier: IntentClassifier,
    detector: ComplexityDetector,
    decomposer: Arc<dyn Decomposer>,
    registry: Arc<AgentRegistry>,
    executor: TaskExecutor,
    validator: ResponseValidator,
    state_store: Arc<dyn StateStore>,
}

impl Orchestrator {
    pub fn new(context: &AppContext) -> Self {
        let registry = Arc::new(AgentRegistry::standard(
            context.model.clone(),
            context.corpus.clone(),
            context.market.clone(),
            context.macro_data.clone(),
            context.settings.retrieval_top_k,
        ));

        Self {
            classifier: IntentClassifier::new(context.model.clone()),
            detector: ComplexityDetector::new(),
            decomposer: Arc::new(LlmDecomposer::new(context.model.clone())),
            executor: TaskExecutor::new(registry.clone()),
            registry,
            validator: ResponseValidator::new(
                CriticAgent::new(context.model.clone()),
                context.settings.min_faithfulness_score,
                context.settings.min_confidence_score,
            ),
            state_store: Arc::new(InMemoryStateStore::new()),
        }
    }

    pub fn with_decomposer(mut self, decomposer: Arc<dyn Decomposer>) -> Self {
        self.decomposer = decomposer;
        self
    }

    pub fn with_state_store(mut self, state_store: Arc<dyn StateStore>) -> Self {
        self.state_store = state_store;
        self
    }

    pub fn state_store(&self) -> Arc<dyn StateStore> {
        self.state_store.clone()
    }

    pub async fn run(&self, query: Query) -> Result<OrchestrationOutcome> {
        let start_time = Instant::now();

        if query.text.trim().is_empty() {
            return Err(OrchestrationError::InvalidQuery(
                "query must not be empty".to_string(),
            ));
        }

        let conversation_id = query
            .conversation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        info!(
            conversation_id = %conversation_id,
            query = %query.text,
            "Orchestrator: starting query"
        );

        let mut state = PipelineState::default();

        // === CLASSIFY ===
        let ctx = StepContext::new(&query, &conversation_id);
        state.apply(self.classify(ctx).await?);

        let intent = state.intent.unwrap_or(Intent::SecFiling);
        let route = state.route.unwrap_or(Route::MultiTask);
        let ctx = ctx.with_intent(intent);

        // === ROUTE ===
        let step = match route {
            Route::Simple(task_type) => self.answer(ctx, task_type).await?,
            Route::MultiTask => self.decompose_and_execute(ctx).await?,
        };
        state.apply(step);

        let output = state.output.take().ok_or_else(|| {
            OrchestrationError::Agent("Pipeline produced no output".to_string())
        })?;

        // === VALIDATE ===
        state.apply(self.validate(ctx, &output).await?);

        let outcome = state.validation.take().ok_or_else(|| {
            OrchestrationError::Agent("Pipeline produced no validation verdict".to_string())
        })?;

        let agents = if state.task_results.is_empty() {
            vec![output.agent_name.clone()]
        } else {
            agents_used(&state.task_results)
        };
        let response = create_final_response(&query.text, &output, agents, &outcome);

        // === CHECKPOINT ===
        let checkpoint = Checkpoint::new(&conversation_id, &query.text, intent, response.clone())?;
        debug!(checkpoint_id = ?checkpoint.checkpoint_id, hash = %checkpoint.context_hash, "Saving checkpoint");
        self.state_store.save_checkpoint(checkpoint).await?;
        state.reasoning_trace.push("CHECKPOINT: saved".to_string());

        let processing_time_ms = start_time.elapsed().as_millis() as u64;

        info!(
            conversation_id = %conversation_id,
            intent = %intent,
            confidence = response.confidence_score,
            needs_human_review = response.needs_human_review,
            processing_time_ms,
            "Orchestrator: query complete"
        );

        Ok(OrchestrationOutcome {
            conversation_id,
            response,
            intent,
            complexity: state.complexity.unwrap_or_else(|| self.detector.detect(&query.text, Some(intent))),
            route,
            task_plan: state.plan,
            task_results: state.task_results,
            reasoning_trace: state.reasoning_trace,
            processing_time_ms,
        })
    }

    async fn classify(&self, ctx: StepContext<'_>) -> Result<StepOutput> {
        let intent = self.classifier.classify(&ctx.query.text).await?;
        let complexity = self.detector.detect(&ctx.query.text, Some(intent));
        let route = route(intent, complexity.is_complex);

        info!(
            conversation_id = %ctx.conversation_id,
            intent = %intent,
            is_complex = complexity.is_complex,
            score = complexity.score,
            route = ?route,
            "Query classified"
        );

        Ok(StepOutput::Classified {
            intent,
            complexity,
            route,
        })
    }

    async fn answer(&self, ctx: StepContext<'_>, task_type: TaskType) -> Result<StepOutput> {
        let intent = ctx.intent()?;
        let agent = self.registry.get(task_type).ok_or_else(|| {
            OrchestrationError::Agent(format!("No agent registered for {}", task_type))
        })?;

        info!(
            conversation_id = %ctx.conversation_id,
            intent = %intent,
            agent = %task_type,
            "Answering with a single agent"
        );

        let input = AgentInput::new(ctx.query.text.clone(), ctx.query.agent_filters());
        let output = agent.execute(&input).await?;

        Ok(StepOutput::Answered { output })
    }

    async fn decompose_and_execute(&self, ctx: StepContext<'_>) -> Result<StepOutput> {
        let plan = self.decomposer.decompose(&ctx.query.text).await?;
        let results = self.executor.execute_plan(&plan, &ctx.query.text).await;
        let output = aggregate(&results);

        info!(
            conversation_id = %ctx.conversation_id,
            task_count = plan.tasks.len(),
            confidence = output.confidence_score,
            "Task results aggregated"
        );

        Ok(StepOutput::Executed {
            plan,
            results,
            output,
        })
    }

    async fn validate(&self, ctx: StepContext<'_>, output: &AgentOutput) -> Result<StepOutput> {
        let intent = ctx.intent()?;
        let outcome = self.validator.validate(output).await?;

        info!(
            conversation_id = %ctx.conversation_id,
            intent = %intent,
            passed = outcome.passed,
            "Response validated"
        );

        Ok(StepOutput::Validated { outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::corpus::{FilingChunk, InMemoryCorpus};
    use crate::llm::ScriptedGenerator;
    use crate::models::Task;
    use crate::planner::StaticDecomposer;
    use crate::providers::{MarketFacet, StaticMacroData, StaticMarketData};

    const GOOD_VERDICT: &str =
        "FAITHFULNESS: 0.9\nCITATION_COVERAGE: 0.9\nUNSUPPORTED_CLAIMS: []\nPASSED: true";

    async fn context(model: ScriptedGenerator) -> AppContext {
        let corpus = InMemoryCorpus::new();
        corpus
            .ingest(vec![FilingChunk::new(
                "AAPL-10K-2023-1",
                "Risk factors: Apple depends on outsourcing partners in Asia for manufacturing.",
            )
            .with_metadata("ticker", "AAPL")])
            .await;

        let market = StaticMarketData::new()
            .with("AAPL", MarketFacet::Metrics, "P/E Ratio: 29.40")
            .with("MSFT", MarketFacet::Metrics, "P/E Ratio: 35.10");

        AppContext::new(
            Settings::default(),
            Arc::new(model),
            Arc::new(corpus),
            Arc::new(market),
            Arc::new(StaticMacroData::new()),
        )
    }

    #[test]
    fn test_routing_table() {
        assert_eq!(route(Intent::SecFiling, false), Route::Simple(TaskType::Filing));
        assert_eq!(route(Intent::Financials, false), Route::Simple(TaskType::Market));
        assert_eq!(route(Intent::Macro, false), Route::Simple(TaskType::Macro));
        assert_eq!(route(Intent::Synthesis, false), Route::MultiTask);
        assert_eq!(route(Intent::Macro, true), Route::MultiTask);
    }

    #[test]
    fn test_pipeline_state_merges_steps() {
        let mut state = PipelineState::default();
        state.apply(StepOutput::Classified {
            intent: Intent::Macro,
            complexity: ComplexityReport {
                is_complex: false,
                score: 0.0,
                reasons: vec![],
            },
            route: Route::Simple(TaskType::Macro),
        });
        assert_eq!(state.intent, Some(Intent::Macro));
        assert!(state.plan.is_none());
        assert!(state.reasoning_trace[0].starts_with("CLASSIFY"));
    }

    #[tokio::test]
    async fn test_simple_path_with_filing_agent() {
        let model = ScriptedGenerator::new()
            .on("Classify this query", "SEC_FILING")
            .on("validation agent", GOOD_VERDICT)
            .on("SEC filing analyst", "Apple relies on partners in Asia [Source 1].");
        let orchestrator = Orchestrator::new(&context(model).await);

        let outcome = orchestrator
            .run(Query::new("What risk factors does Apple list").with_ticker("aapl"))
            .await
            .unwrap();

        assert_eq!(outcome.intent, Intent::SecFiling);
        assert_eq!(outcome.route, Route::Simple(TaskType::Filing));
        assert!(outcome.task_plan.is_none());
        assert_eq!(outcome.response.agents_used, vec!["sec_rag_agent"]);
        assert_eq!(outcome.response.citations.len(), 1);
        assert_eq!(outcome.response.citations[0].source_id, "AAPL-10K-2023-1");
    }

    #[tokio::test]
    async fn test_multi_task_path_uses_synthesis() {
        let model = ScriptedGenerator::new()
            .on("Classify this query", "FINANCIALS")
            .on("validation agent", GOOD_VERDICT)
            .on("Available Data:", "MSFT trades at a premium to AAPL.")
            .with_default("P/E analysis");

        let plan = TaskPlan {
            tasks: vec![
                Task::new("t1", TaskType::Market, "AAPL P/E ratio").with_ticker("AAPL"),
                Task::new("t2", TaskType::Market, "MSFT P/E ratio").with_ticker("MSFT"),
                Task::new("t3", TaskType::Synthesis, "Compare").depending_on(&["t1", "t2"]),
            ],
            reasoning: "two lookups then compare".into(),
            can_parallelize: true,
        };

        let orchestrator = Orchestrator::new(&context(model).await)
            .with_decomposer(Arc::new(StaticDecomposer::new(plan)));

        let outcome = orchestrator
            .run(Query::new("Compare AAPL and MSFT P/E ratios"))
            .await
            .unwrap();

        assert_eq!(outcome.route, Route::MultiTask);
        assert_eq!(outcome.response.response, "MSFT trades at a premium to AAPL.");
        assert_eq!(outcome.task_results.len(), 3);
        assert_eq!(outcome.response.agents_used, vec!["openbb_agent", "synthesis_agent"]);
    }

    #[tokio::test]
    async fn test_checkpoints_follow_conversation_id() {
        let model = ScriptedGenerator::new()
            .on("Classify this query", "FINANCIALS")
            .on("validation agent", GOOD_VERDICT)
            .with_default("AAPL trades at 29.4 times earnings.");
        let orchestrator = Orchestrator::new(&context(model).await);

        for _ in 0..2 {
            orchestrator
                .run(Query::new("AAPL P/E ratio").with_conversation("conv-42"))
                .await
                .unwrap();
        }
        let fresh = orchestrator.run(Query::new("AAPL P/E ratio")).await.unwrap();

        let store = orchestrator.state_store();
        assert_eq!(store.history("conv-42").await.unwrap().len(), 2);
        assert_ne!(fresh.conversation_id, "conv-42");
        assert_eq!(store.history(&fresh.conversation_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_steps_after_classify_require_intent() {
        let model = ScriptedGenerator::new()
            .on("validation agent", GOOD_VERDICT)
            .with_default("AAPL trades at 29.4 times earnings.");
        let orchestrator = Orchestrator::new(&context(model).await);
        let query = Query::new("AAPL P/E ratio");

        let unclassified = StepContext::new(&query, "conv-7");
        assert!(unclassified.intent().is_err());
        let err = orchestrator
            .answer(unclassified, TaskType::Market)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OrchestrationError::Agent(_)));

        let ctx = unclassified.with_intent(Intent::Financials);
        assert_eq!(ctx.conversation_id, "conv-7");
        assert_eq!(ctx.intent().unwrap(), Intent::Financials);

        let StepOutput::Answered { output } = orchestrator.answer(ctx, TaskType::Market).await.unwrap() else {
            panic!("expected an answer step");
        };
        assert_eq!(output.agent_name, "openbb_agent");
        assert!(orchestrator.validate(unclassified, &output).await.is_err());
        assert!(orchestrator.validate(ctx, &output).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let orchestrator = Orchestrator::new(&context(ScriptedGenerator::new()).await);
        let err = orchestrator.run(Query::new("   ")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidQuery(_)));
    }
}
