//! Query complexity detection
//!
//! Decides whether a query goes down the single-agent path or gets
//! decomposed into a task plan. The numeric score is diagnostic only;
//! routing uses the boolean.

use crate::models::Intent;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "compare",
    "contrast",
    "versus",
    "vs",
    "and also",
    "how does",
    "impact",
    "relationship",
    "correlation",
    "combined with",
    "along with",
    "as well as",
    "difference between",
    "similarities",
    "both",
    "together with",
    "in context of",
    "relative to",
    "compared to",
    "against",
    "alongside",
];

const FINANCIAL_TERMS: &[&str] = &[
    "p/e", "pe ratio", "price", "earnings", "stock", "share", "dividend",
];

const MACRO_TERMS: &[&str] = &[
    "gdp",
    "inflation",
    "unemployment",
    "interest rate",
    "fed",
    "economy",
    "economic",
];

const ENTITY_NOUNS: &[&str] = &["stock", "company", "companies"];

/// Upper-case acronyms that look like tickers but are not.
const TICKER_STOPLIST: &[&str] = &["USA", "US", "CEO", "CFO", "CTO", "AI", "ML", "IT"];

fn ticker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[A-Z]{2,5}\b").expect("valid ticker pattern"))
}

/// Distinct ticker-shaped tokens (2-5 upper-case letters) in order of first
/// appearance, excluding common acronyms.
pub fn extract_tickers(query: &str) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for m in ticker_pattern().find_iter(query) {
        let token = m.as_str();
        if !TICKER_STOPLIST.contains(&token) && !tickers.iter().any(|t| t == token) {
            tickers.push(token.to_string());
        }
    }
    tickers
}

/// Full diagnostic view of a complexity decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub is_complex: bool,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityDetector;

impl ComplexityDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn is_complex(&self, query: &str, intent: Option<Intent>) -> bool {
        if intent == Some(Intent::Synthesis) {
            return true;
        }

        let lowered = query.to_lowercase();

        let has_keywords = COMPLEXITY_KEYWORDS.iter().any(|kw| lowered.contains(kw));
        let has_multiple_questions = query.matches('?').count() > 1 || query.contains(';');
        let has_multiple_tickers = extract_tickers(query).len() > 1;
        let has_and_conjunction = lowered.contains(" and ")
            && (has_multiple_tickers || ENTITY_NOUNS.iter().any(|w| lowered.contains(w)));

        has_keywords
            || has_multiple_questions
            || has_multiple_tickers
            || has_and_conjunction
            || is_cross_domain(&lowered)
    }

    /// Weighted score in [0, 1].
    pub fn score(&self, query: &str) -> f64 {
        let lowered = query.to_lowercase();
        let mut score = 0.0;

        let keyword_hits = COMPLEXITY_KEYWORDS
            .iter()
            .filter(|kw| lowered.contains(*kw))
            .count();
        score += (keyword_hits as f64 * 0.1).min(0.3);

        if query.matches('?').count() > 1 {
            score += 0.2;
        }

        let tickers = extract_tickers(query).len();
        if tickers > 1 {
            score += (tickers as f64 * 0.15).min(0.3);
        }

        let words = query.split_whitespace().count();
        if words > 15 {
            score += ((words - 15) as f64 * 0.02).min(0.2);
        }

        score.min(1.0)
    }

    pub fn reasons(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        let mut reasons = Vec::new();

        let found: Vec<&str> = COMPLEXITY_KEYWORDS
            .iter()
            .copied()
            .filter(|kw| lowered.contains(kw))
            .take(3)
            .collect();
        if !found.is_empty() {
            reasons.push(format!("Contains complexity keywords: {}", found.join(", ")));
        }

        let question_marks = query.matches('?').count();
        if question_marks > 1 {
            reasons.push(format!("Multiple questions ({} question marks)", question_marks));
        }

        let tickers = extract_tickers(query);
        if tickers.len() > 1 {
            reasons.push(format!("Multiple tickers: {}", tickers.join(", ")));
        }

        if lowered.contains(" and ") {
            reasons.push("Contains 'and' conjunction (potential multiple entities)".to_string());
        }

        if is_cross_domain(&lowered) {
            reasons.push("Mixes company financials with macroeconomic indicators".to_string());
        }

        if reasons.is_empty() {
            reasons.push("Query is simple (single-domain)".to_string());
        }
        reasons
    }

    pub fn detect(&self, query: &str, intent: Option<Intent>) -> ComplexityReport {
        ComplexityReport {
            is_complex: self.is_complex(query, intent),
            score: self.score(query),
            reasons: self.reasons(query),
        }
    }
}

fn is_cross_domain(lowered: &str) -> bool {
    FINANCIAL_TERMS.iter().any(|t| lowered.contains(t))
        && MACRO_TERMS.iter().any(|t| lowered.contains(t))
}
