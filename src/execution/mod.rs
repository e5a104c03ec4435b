//! Task plan execution
//!
//! Runs a sanitized plan one task at a time. A task whose agent fails is
//! recorded with a stub output and execution carries on.

use crate::agent::{
    Agent, FilingAgent, MacroAgent, MarketAgent, SynthesisAgent, FRED_AGENT, OPENBB_AGENT,
    SEC_RAG_AGENT, SYNTHESIS_AGENT,
};
use crate::corpus::Corpus;
use crate::error::OrchestrationError;
use crate::llm::TextGenerator;
use crate::models::{
    AgentInput, AgentOutput, Filters, Task, TaskPlan, TaskResult, TaskStatus, TaskType,
    UpstreamOutput,
};
use crate::providers::{MacroDataProvider, MarketDataProvider};
use crate::Result;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maps each task type to the agent that handles it.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<TaskType, Arc<Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one agent per task type, all sharing the same backends.
    pub fn standard(
        model: Arc<dyn TextGenerator>,
        corpus: Arc<dyn Corpus>,
        market: Arc<dyn MarketDataProvider>,
        macro_data: Arc<dyn MacroDataProvider>,
        top_k: usize,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(
            TaskType::Filing,
            Agent::Filing(FilingAgent::new(model.clone(), corpus, top_k)),
        );
        registry.register(
            TaskType::Market,
            Agent::Market(MarketAgent::new(model.clone(), market)),
        );
        registry.register(
            TaskType::Macro,
            Agent::Macro(MacroAgent::new(model.clone(), macro_data)),
        );
        registry.register(TaskType::Synthesis, Agent::Synthesis(SynthesisAgent::new(model)));
        registry
    }

    pub fn register(&mut self, task_type: TaskType, agent: Agent) {
        self.agents.insert(task_type, Arc::new(agent));
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<Agent>> {
        self.agents.get(&task_type).cloned()
    }
}

/// Agent name reported for a task type, also used for stub outputs.
pub fn agent_name_for(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Filing => SEC_RAG_AGENT,
        TaskType::Market => OPENBB_AGENT,
        TaskType::Macro => FRED_AGENT,
        TaskType::Synthesis => SYNTHESIS_AGENT,
    }
}

/// Executes task plans sequentially in dependency order
pub struct TaskExecutor {
    registry: Arc<AgentRegistry>,
}

impl TaskExecutor {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Execute every task in the plan exactly once. Results come back in
    /// completion order.
    pub async fn execute_plan(&self, plan: &TaskPlan, original_query: &str) -> Vec<TaskResult> {
        info!(task_count = plan.tasks.len(), "Executing task plan sequentially");

        let mut results: Vec<TaskResult> = Vec::with_capacity(plan.tasks.len());
        let mut completed: HashSet<String> = HashSet::with_capacity(plan.tasks.len());

        while completed.len() < plan.tasks.len() {
            let ready = plan.tasks.iter().find(|t| {
                !completed.contains(&t.id) && t.depends_on.iter().all(|d| completed.contains(d))
            });

            match ready {
                Some(task) => {
                    let result = self.run_task(task, &results, original_query).await;
                    completed.insert(task.id.clone());
                    results.push(result);
                }
                None => {
                    let remaining: Vec<&Task> = plan
                        .tasks
                        .iter()
                        .filter(|t| !completed.contains(&t.id))
                        .collect();

                    warn!(
                        remaining = ?remaining.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
                        "No task is ready, forcing execution of remaining tasks"
                    );

                    for task in remaining {
                        let result = self.run_task(task, &results, original_query).await;
                        completed.insert(task.id.clone());
                        results.push(result);
                    }
                }
            }
        }

        let failed = results.iter().filter(|r| !r.succeeded()).count();
        info!(
            completed = results.len(),
            failed,
            "Plan execution complete"
        );

        results
    }

    async fn run_task(&self, task: &Task, finished: &[TaskResult], original_query: &str) -> TaskResult {
        debug!(task_id = %task.id, task_type = %task.task_type, query = %task.query, "Executing task");

        match self.execute_task(task, finished, original_query).await {
            Ok(output) => {
                info!(
                    task_id = %task.id,
                    confidence = output.confidence_score,
                    citation_count = output.citations.len(),
                    "Task succeeded"
                );
                TaskResult {
                    task_id: task.id.clone(),
                    task_type: task.task_type,
                    status: TaskStatus::Success,
                    output,
                    error: None,
                }
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Task failed");
                let message = e.to_string();
                TaskResult {
                    task_id: task.id.clone(),
                    task_type: task.task_type,
                    status: TaskStatus::Failed,
                    output: AgentOutput::failed(agent_name_for(task.task_type), &message),
                    error: Some(message),
                }
            }
        }
    }

    async fn execute_task(
        &self,
        task: &Task,
        finished: &[TaskResult],
        original_query: &str,
    ) -> Result<AgentOutput> {
        let agent = self.registry.get(task.task_type).ok_or_else(|| {
            OrchestrationError::Agent(format!("No agent registered for task type {}", task.task_type))
        })?;

        let mut filters = Filters::new();
        if let Some(ticker) = task.ticker.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            filters.insert("ticker".to_string(), Value::String(ticker.to_uppercase()));
        }

        let input = if task.task_type == TaskType::Synthesis {
            let query = if task.query.trim().is_empty() {
                original_query
            } else {
                task.query.as_str()
            };

            let upstream = task
                .depends_on
                .iter()
                .filter_map(|dep| finished.iter().find(|r| &r.task_id == dep))
                .map(|r| UpstreamOutput {
                    task_id: r.task_id.clone(),
                    output: r.output.clone(),
                    failed: !r.succeeded(),
                })
                .collect();

            AgentInput::new(query, filters).with_upstream(upstream)
        } else {
            AgentInput::new(task.query.clone(), filters)
        };

        agent.execute(&input).await
    }
}
