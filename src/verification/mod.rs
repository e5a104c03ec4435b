//! Response validation
//!
//! Three stages: deterministic rule checks, one critic pass, then a
//! threshold gate. A failed validation never blocks a response; it marks it
//! for human review.

use crate::agent::CriticAgent;
use crate::models::{AgentOutput, CriticOutput, FinalResponse};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// Minimum response length, in characters, accepted by the rule checks.
pub const MIN_RESPONSE_CHARS: usize = 10;

pub const FAILED_RULE_CHECKS: &str = "Failed rule-based checks";

/// How a failing rule affects the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Logged only
    Warning,
    /// Fails validation outright
    Blocking,
}

/// Trait for verification rules
pub trait VerificationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn severity(&self) -> Severity {
        Severity::Blocking
    }

    fn verify(&self, output: &AgentOutput) -> VerificationCheckResult;
}

pub struct VerificationCheckResult {
    pub passed: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleCheck {
    pub rule_name: String,
    pub passed: bool,
    pub severity: Severity,
    pub details: String,
}

/// Runs every registered rule against an output
pub struct VerificationEngine {
    rules: Vec<Box<dyn VerificationRule>>,
}

impl VerificationEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn VerificationRule>) {
        self.rules.push(rule);
    }

    pub fn verify(&self, output: &AgentOutput) -> Vec<RuleCheck> {
        self.rules
            .iter()
            .map(|rule| {
                let result = rule.verify(output);
                if !result.passed {
                    warn!(
                        rule = rule.name(),
                        severity = ?rule.severity(),
                        details = %result.details,
                        "Verification rule failed"
                    );
                }
                RuleCheck {
                    rule_name: rule.name().to_string(),
                    passed: result.passed,
                    severity: rule.severity(),
                    details: result.details,
                }
            })
            .collect()
    }
}

impl Default for VerificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine with the standard response rules
pub fn create_default_engine() -> VerificationEngine {
    let mut engine = VerificationEngine::new();
    engine.add_rule(Box::new(NonEmptyResponseRule));
    engine.add_rule(Box::new(CitationGroundingRule));
    engine.add_rule(Box::new(CitationPresenceRule));
    engine
}

//
// ================= Rules =================
//

/// Rule: response text must carry at least [`MIN_RESPONSE_CHARS`] characters
pub struct NonEmptyResponseRule;

impl VerificationRule for NonEmptyResponseRule {
    fn name(&self) -> &'static str {
        "non_empty_response"
    }

    fn verify(&self, output: &AgentOutput) -> VerificationCheckResult {
        let length = output.response_text.trim().chars().count();
        VerificationCheckResult {
            passed: length >= MIN_RESPONSE_CHARS,
            details: format!("Response has {} characters", length),
        }
    }
}

/// Rule: every citation must point at a retrieved context
pub struct CitationGroundingRule;

impl VerificationRule for CitationGroundingRule {
    fn name(&self) -> &'static str {
        "citation_grounding"
    }

    fn verify(&self, output: &AgentOutput) -> VerificationCheckResult {
        let known: HashSet<&str> = output
            .retrieved_contexts
            .iter()
            .map(|c| c.source_id.as_str())
            .collect();

        let untraced: Vec<&str> = output
            .citations
            .iter()
            .map(|c| c.source_id.as_str())
            .filter(|id| !known.contains(id))
            .collect();

        VerificationCheckResult {
            passed: untraced.is_empty(),
            details: if untraced.is_empty() {
                "All citations traced to retrieved sources".to_string()
            } else {
                format!("Citations to unknown sources: {}", untraced.join(", "))
            },
        }
    }
}

/// Rule: an answer built from evidence should cite some of it
pub struct CitationPresenceRule;

impl VerificationRule for CitationPresenceRule {
    fn name(&self) -> &'static str {
        "citation_presence"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn verify(&self, output: &AgentOutput) -> VerificationCheckResult {
        let passed = output.retrieved_contexts.is_empty() || !output.citations.is_empty();
        VerificationCheckResult {
            passed,
            details: format!(
                "{} citations over {} contexts",
                output.citations.len(),
                output.retrieved_contexts.len()
            ),
        }
    }
}

//
// ================= Validator =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub critic: CriticOutput,
    pub checks: Vec<RuleCheck>,
}

/// Rule checks, critic pass and threshold gate
pub struct ResponseValidator {
    engine: VerificationEngine,
    critic: CriticAgent,
    min_faithfulness: f64,
    min_confidence: f64,
}

impl ResponseValidator {
    pub fn new(critic: CriticAgent, min_faithfulness: f64, min_confidence: f64) -> Self {
        Self {
            engine: create_default_engine(),
            critic,
            min_faithfulness,
            min_confidence,
        }
    }

    pub async fn validate(&self, output: &AgentOutput) -> Result<ValidationOutcome> {
        let checks = self.engine.verify(output);

        let rules_passed = checks
            .iter()
            .all(|c| c.passed || c.severity == Severity::Warning);

        if !rules_passed {
            info!(agent = %output.agent_name, "Rule checks failed, skipping critic");
            return Ok(ValidationOutcome {
                passed: false,
                critic: CriticOutput {
                    faithfulness_score: 0.0,
                    citation_coverage: 0.0,
                    unsupported_claims: vec![FAILED_RULE_CHECKS.to_string()],
                    passed: false,
                },
                checks,
            });
        }

        let critic = self
            .critic
            .validate(&output.response_text, &output.retrieved_contexts)
            .await?;

        let passed = critic.faithfulness_score >= self.min_faithfulness
            && output.confidence_score >= self.min_confidence
            && critic.passed;

        info!(
            agent = %output.agent_name,
            passed,
            faithfulness = critic.faithfulness_score,
            confidence = output.confidence_score,
            "Validation complete"
        );

        Ok(ValidationOutcome {
            passed,
            critic,
            checks,
        })
    }
}

/// Wrap a validated output into the externally visible response.
pub fn create_final_response(
    query: &str,
    output: &AgentOutput,
    agents_used: Vec<String>,
    outcome: &ValidationOutcome,
) -> FinalResponse {
    FinalResponse {
        query: query.to_string(),
        response: output.response_text.clone(),
        citations: output.citations.clone(),
        agents_used,
        faithfulness_score: outcome.critic.faithfulness_score,
        confidence_score: output.confidence_score,
        needs_human_review: !outcome.passed,
    }
}
