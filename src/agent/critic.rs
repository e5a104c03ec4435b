//! Faithfulness critic used by the response validator

use crate::llm::TextGenerator;
use crate::models::{truncate_chars, CriticOutput, RetrievedContext};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = r#"You are a validation agent. Your job is to check if a response is faithful to its sources.

For each claim in the response, verify:
1. Is it supported by the provided sources?
2. Are citations correct?
3. Are there any unsupported claims?

Respond in this exact format:
FAITHFULNESS: [0.0-1.0]
CITATION_COVERAGE: [0.0-1.0]
UNSUPPORTED_CLAIMS: [list of claims without source support]
PASSED: [true/false]"#;

/// Characters of each context shown to the critic.
const CRITIC_EXCERPT_CHARS: usize = 500;

const DEFAULT_FAITHFULNESS: f64 = 0.8;
const DEFAULT_COVERAGE: f64 = 0.8;

pub struct CriticAgent {
    model: Arc<dyn TextGenerator>,
}

impl CriticAgent {
    pub fn new(model: Arc<dyn TextGenerator>) -> Self {
        Self { model }
    }

    pub fn name(&self) -> &'static str {
        super::CRITIC_AGENT
    }

    pub async fn validate(
        &self,
        response_text: &str,
        contexts: &[RetrievedContext],
    ) -> Result<CriticOutput> {
        if contexts.is_empty() {
            return Ok(CriticOutput {
                faithfulness_score: 0.0,
                citation_coverage: 0.0,
                unsupported_claims: vec!["No sources provided".to_string()],
                passed: false,
            });
        }

        let sources = contexts
            .iter()
            .enumerate()
            .map(|(i, ctx)| format!("[Source {}]: {}", i + 1, truncate_chars(&ctx.text, CRITIC_EXCERPT_CHARS)))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Validate this response against its sources.\n\nRESPONSE:\n{}\n\nSOURCES:\n{}\n\nAnalyze faithfulness and citation coverage.",
            response_text, sources
        );

        let result = self.model.generate(&prompt, Some(SYSTEM_PROMPT), 0.1).await?;
        let verdict = parse_critic_response(&result.content);

        debug!(
            faithfulness = verdict.faithfulness_score,
            coverage = verdict.citation_coverage,
            passed = verdict.passed,
            "Critic verdict parsed"
        );

        Ok(verdict)
    }
}

/// Read the four fixed-format verdict lines. Missing or malformed lines keep
/// their defaults, so a sloppy critic reply never fails validation outright.
pub fn parse_critic_response(response: &str) -> CriticOutput {
    let mut verdict = CriticOutput {
        faithfulness_score: DEFAULT_FAITHFULNESS,
        citation_coverage: DEFAULT_COVERAGE,
        unsupported_claims: Vec::new(),
        passed: true,
    };

    for line in response.trim().lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("FAITHFULNESS:") {
            if let Some(score) = parse_score(rest) {
                verdict.faithfulness_score = score;
            }
        } else if let Some(rest) = line.strip_prefix("CITATION_COVERAGE:") {
            if let Some(score) = parse_score(rest) {
                verdict.citation_coverage = score;
            }
        } else if let Some(rest) = line.strip_prefix("UNSUPPORTED_CLAIMS:") {
            let claims = rest.trim();
            if !claims.is_empty() && claims != "[]" {
                verdict.unsupported_claims = claims
                    .trim_matches(|c| c == '[' || c == ']')
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
            }
        } else if line.starts_with("PASSED:") {
            verdict.passed = line.to_lowercase().contains("true");
        }
    }

    verdict
}

fn parse_score(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}
