//! Text-generation capability
//!
//! Every agent, the intent classifier, the decomposer and the critic talk to the
//! model through [`TextGenerator`]. One instance is built at startup and shared.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiGenerator;

/// Response from a generation call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
}

/// Single-call text generation. Must be safe to invoke from concurrent queries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ModelResponse>;
}

enum Reply {
    Text(String),
    Fail(String),
}

/// Deterministic generator for development and tests.
///
/// Resolution order per call: first rule whose needle occurs in the system
/// prompt or prompt, then the FIFO queue, then the default reply.
pub struct ScriptedGenerator {
    rules: Vec<(String, Reply)>,
    queue: Mutex<VecDeque<String>>,
    default_reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            default_reply: "SEC_FILING".to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.rules
            .push((needle.to_string(), Reply::Text(reply.to_string())));
        self
    }

    /// Fail any call whose prompt contains `needle`, simulating a backend outage.
    pub fn fail_on(mut self, needle: &str, message: &str) -> Self {
        self.rules
            .push((needle.to_string(), Reply::Fail(message.to_string())));
        self
    }

    pub fn then(self, reply: &str) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(reply.to_string());
        }
        self
    }

    pub fn with_default(mut self, reply: &str) -> Self {
        self.default_reply = reply.to_string();
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        _temperature: f32,
    ) -> Result<ModelResponse> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let haystack = format!("{}\n{}", system_prompt.unwrap_or_default(), prompt);

        let matched = self
            .rules
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()));

        let content = match matched {
            Some((_, Reply::Text(text))) => text.clone(),
            Some((_, Reply::Fail(message))) => {
                return Err(OrchestrationError::Llm(message.clone()));
            }
            None => self
                .queue
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front())
                .unwrap_or_else(|| self.default_reply.clone()),
        };

        Ok(ModelResponse {
            content,
            model: "scripted".to_string(),
        })
    }
}
