//! Query decomposition
//!
//! A [`Decomposer`] turns a complex query into a [`TaskPlan`]. Whatever the
//! model proposes is validated, then sanitized into an acyclic plan before
//! anything executes.

use crate::error::OrchestrationError;
use crate::models::{Task, TaskPlan, TaskType};
use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::warn;

pub mod decomposer;
pub use decomposer::LlmDecomposer;

/// Trait for query decomposition (LLM controlled)
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, query: &str) -> Result<TaskPlan>;
}

/// Fixed-plan decomposer for development & testing.
/// The plan still goes through validation and sanitization.
pub struct StaticDecomposer {
    plan: TaskPlan,
}

impl StaticDecomposer {
    pub fn new(plan: TaskPlan) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Decomposer for StaticDecomposer {
    async fn decompose(&self, _query: &str) -> Result<TaskPlan> {
        validate_plan(&self.plan)?;
        Ok(sanitize_plan(self.plan.clone()))
    }
}

/// Structural checks that sanitization cannot repair.
pub fn validate_plan(plan: &TaskPlan) -> Result<()> {
    if plan.tasks.is_empty() {
        return Err(OrchestrationError::Decomposition(
            "Task plan contains no tasks".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for task in &plan.tasks {
        if task.id.trim().is_empty() {
            return Err(OrchestrationError::Decomposition(
                "Task with empty id".to_string(),
            ));
        }
        if !seen.insert(task.id.as_str()) {
            return Err(OrchestrationError::Decomposition(format!(
                "Duplicate task id: {}",
                task.id
            )));
        }
    }

    Ok(())
}

/// Repair dependencies so the plan is executable.
///
/// Drops self-references and references to unknown ids. If a cycle survives,
/// non-synthesis tasks lose all dependencies and every synthesis task depends
/// on every non-synthesis task.
pub fn sanitize_plan(mut plan: TaskPlan) -> TaskPlan {
    let known: HashSet<String> = plan.tasks.iter().map(|t| t.id.clone()).collect();

    for task in &mut plan.tasks {
        let id = task.id.clone();
        task.depends_on.retain(|dep| *dep != id && known.contains(dep));
    }

    if has_cycle(&plan.tasks) {
        warn!(
            task_count = plan.tasks.len(),
            "Circular dependency detected, collapsing plan to synthesis-over-all"
        );

        let leaves: Vec<String> = plan
            .tasks
            .iter()
            .filter(|t| t.task_type != TaskType::Synthesis)
            .map(|t| t.id.clone())
            .collect();

        for task in &mut plan.tasks {
            task.depends_on = if task.task_type == TaskType::Synthesis {
                leaves.clone()
            } else {
                Vec::new()
            };
        }
    }

    plan
}

/// Depth-first search with a recursion stack. Dependencies on unknown ids
/// are ignored.
pub fn has_cycle(tasks: &[Task]) -> bool {
    let graph: HashMap<&str, &[String]> = tasks
        .iter()
        .map(|t| (t.id.as_str(), t.depends_on.as_slice()))
        .collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    tasks
        .iter()
        .any(|t| dfs_cycle(t.id.as_str(), &graph, &mut visited, &mut rec_stack))
}

fn dfs_cycle<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, &'a [String]>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
) -> bool {
    if rec_stack.contains(node) {
        return true;
    }
    if !visited.insert(node) {
        return false;
    }

    rec_stack.insert(node);

    if let Some(&deps) = graph.get(node) {
        for dep in deps {
            if graph.contains_key(dep.as_str())
                && dfs_cycle(dep.as_str(), graph, visited, rec_stack)
            {
                return true;
            }
        }
    }

    rec_stack.remove(node);
    false
}

/// Group task ids into waves whose dependencies are met by earlier waves.
/// On deadlock the remaining ids form one final wave.
pub fn execution_waves(plan: &TaskPlan) -> Vec<Vec<String>> {
    let mut waves = Vec::new();
    let mut completed: HashSet<&str> = HashSet::new();

    while completed.len() < plan.tasks.len() {
        let ready: Vec<&str> = plan
            .tasks
            .iter()
            .filter(|t| !completed.contains(t.id.as_str()))
            .filter(|t| t.depends_on.iter().all(|d| completed.contains(d.as_str())))
            .map(|t| t.id.as_str())
            .collect();

        if ready.is_empty() {
            let remaining: Vec<String> = plan
                .tasks
                .iter()
                .filter(|t| !completed.contains(t.id.as_str()))
                .map(|t| t.id.clone())
                .collect();
            warn!(?remaining, "Deadlock in execution waves, forcing remaining tasks");
            waves.push(remaining);
            break;
        }

        completed.extend(ready.iter().copied());
        waves.push(ready.into_iter().map(String::from).collect());
    }

    waves
}
