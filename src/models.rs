//! Core data models for the research orchestrator

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Open string-keyed mapping used for query filters and context metadata.
pub type Filters = serde_json::Map<String, Value>;

/// Maximum length of a citation excerpt, in characters.
pub const CITATION_EXCERPT_CHARS: usize = 300;

//
// ================= Enums =================
//

/// Primary data domain of a query. Drives simple-path routing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SecFiling,
    Financials,
    Macro,
    Synthesis,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::SecFiling,
        Intent::Financials,
        Intent::Macro,
        Intent::Synthesis,
    ];

    /// Upper-case label used in classifier prompts and responses.
    pub fn label(&self) -> &'static str {
        match self {
            Intent::SecFiling => "SEC_FILING",
            Intent::Financials => "FINANCIALS",
            Intent::Macro => "MACRO",
            Intent::Synthesis => "SYNTHESIS",
        }
    }

    pub fn from_label(label: &str) -> Option<Intent> {
        Intent::ALL.into_iter().find(|i| i.label() == label)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SecFiling => "sec_filing",
            Intent::Financials => "financials",
            Intent::Macro => "macro",
            Intent::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    SecFiling,
    FinancialData,
    MacroData,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::SecFiling => "sec_filing",
            SourceType::FinancialData => "financial_data",
            SourceType::MacroData => "macro_data",
        }
    }

    /// Parse the `source_type` metadata tag carried by agent contexts.
    pub fn from_tag(tag: &str) -> Option<SourceType> {
        match tag {
            "sec_filing" => Some(SourceType::SecFiling),
            "financial_data" => Some(SourceType::FinancialData),
            "macro_data" => Some(SourceType::MacroData),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Query =================
//

/// Immutable caller-owned input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub ticker: Option<String>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub filters: Filters,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ticker: None,
            conversation_id: None,
            filters: Filters::new(),
        }
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Filters handed to an agent: the caller's filters plus the upper-cased
    /// ticker, which wins over any `ticker` key already present.
    pub fn agent_filters(&self) -> Filters {
        let mut filters = self.filters.clone();
        if let Some(ticker) = self.ticker.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            filters.insert("ticker".to_string(), Value::String(ticker.to_uppercase()));
        }
        filters
    }
}

//
// ================= Evidence =================
//

/// One scored evidence passage plus its source identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedContext {
    pub source_id: String,
    pub text: String,
    pub relevance_score: f64,
    #[serde(default)]
    pub metadata: Filters,
}

impl RetrievedContext {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            relevance_score: relevance_score.clamp(0.0, 1.0),
            metadata: Filters::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub source_type: SourceType,
    pub source_id: String,
    pub text_excerpt: String,
    pub relevance_score: f64,
}

impl Citation {
    pub fn from_context(source_type: SourceType, context: &RetrievedContext) -> Self {
        Self {
            source_type,
            source_id: context.source_id.clone(),
            text_excerpt: truncate_chars(&context.text, CITATION_EXCERPT_CHARS),
            relevance_score: context.relevance_score.clamp(0.0, 1.0),
        }
    }
}

//
// ================= Agent I/O =================
//

/// Output of an upstream task, handed to a synthesis agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamOutput {
    pub task_id: String,
    pub output: AgentOutput,
    /// Set when the upstream task failed and `output` is an error stub.
    #[serde(default)]
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    pub query: String,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub upstream: Vec<UpstreamOutput>,
}

impl AgentInput {
    pub fn new(query: impl Into<String>, filters: Filters) -> Self {
        Self {
            query: query.into(),
            filters,
            upstream: Vec::new(),
        }
    }

    pub fn with_upstream(mut self, upstream: Vec<UpstreamOutput>) -> Self {
        self.upstream = upstream;
        self
    }

    pub fn ticker(&self) -> Option<&str> {
        self.filters
            .get("ticker")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Uniform result of one agent invocation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent_name: String,
    pub response_text: String,
    pub citations: Vec<Citation>,
    pub retrieved_contexts: Vec<RetrievedContext>,
    pub confidence_score: f64,
    pub processing_time_ms: u64,
}

impl AgentOutput {
    /// Stub output recorded for a task whose agent raised.
    pub fn failed(agent_name: &str, message: &str) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            response_text: format!("Error: {}", message),
            citations: Vec::new(),
            retrieved_contexts: Vec::new(),
            confidence_score: 0.0,
            processing_time_ms: 0,
        }
    }
}

//
// ================= Task Plan =================
//

/// Which agent handles a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskType {
    #[serde(rename = "filing", alias = "sec")]
    Filing,
    #[serde(rename = "market", alias = "openbb")]
    Market,
    #[serde(rename = "macro", alias = "fred")]
    Macro,
    #[serde(rename = "synthesis")]
    Synthesis,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Filing => "filing",
            TaskType::Market => "market",
            TaskType::Macro => "macro",
            TaskType::Synthesis => "synthesis",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(id: &str, task_type: TaskType, query: &str) -> Self {
        Self {
            id: id.to_string(),
            task_type,
            query: query.to_string(),
            ticker: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_ticker(mut self, ticker: &str) -> Self {
        self.ticker = Some(ticker.to_string());
        self
    }

    pub fn depending_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskPlan {
    pub tasks: Vec<Task>,
    pub reasoning: String,
    #[serde(default = "default_true")]
    pub can_parallelize: bool,
}

fn default_true() -> bool {
    true
}

//
// ================= Execution =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub output: AgentOutput,
    pub error: Option<String>,
}

impl TaskResult {
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

//
// ================= Validation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriticOutput {
    pub faithfulness_score: f64,
    pub citation_coverage: f64,
    pub unsupported_claims: Vec<String>,
    pub passed: bool,
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    pub query: String,
    pub response: String,
    pub citations: Vec<Citation>,
    pub agents_used: Vec<String>,
    pub faithfulness_score: f64,
    pub confidence_score: f64,
    pub needs_human_review: bool,
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_accepts_agent_aliases() {
        let task: Task = serde_json::from_str(
            r#"{"id": "t1", "type": "openbb", "query": "Get AAPL P/E", "ticker": "AAPL"}"#,
        )
        .unwrap();
        assert_eq!(task.task_type, TaskType::Market);
        assert!(task.depends_on.is_empty());

        let task: Task = serde_json::from_str(r#"{"id": "t2", "type": "fred", "query": "GDP"}"#).unwrap();
        assert_eq!(task.task_type, TaskType::Macro);
    }

    #[test]
    fn test_unknown_task_type_rejected() {
        let parsed = serde_json::from_str::<Task>(r#"{"id": "t1", "type": "weather", "query": "x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_agent_filters_uppercases_ticker() {
        let mut filters = Filters::new();
        filters.insert("form".to_string(), Value::String("10-K".to_string()));
        let query = Query::new("risk factors").with_ticker(" aapl ").with_filters(filters);

        let merged = query.agent_filters();
        assert_eq!(merged.get("ticker"), Some(&Value::String("AAPL".to_string())));
        assert_eq!(merged.get("form"), Some(&Value::String("10-K".to_string())));
    }

    #[test]
    fn test_intent_labels_round_trip() {
        for intent in Intent::ALL {
            assert_eq!(Intent::from_label(intent.label()), Some(intent));
        }
        assert_eq!(Intent::from_label("WEATHER"), None);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
