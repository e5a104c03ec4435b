//! SEC filing retrieval agent

use super::{format_contexts, SOURCE_TYPE_KEY};
use crate::corpus::Corpus;
use crate::llm::TextGenerator;
use crate::models::{Citation, Filters, RetrievedContext, SourceType};
use crate::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

pub const NO_FILING_DATA: &str = "No relevant SEC filing information found.";

const SYSTEM_PROMPT: &str = r#"You are an SEC filing analyst. Analyze regulatory filings and provide accurate, cited responses.

Rules:
1. Only use information from the provided sources
2. Cite sources using [Source N] format
3. Use exact figures from sources
4. If information is not in sources, say so clearly
5. Never make up information"#;

/// Filters forwarded to the corpus. Other query filters are not chunk metadata.
const CORPUS_FILTER_KEYS: &[&str] = &["ticker", "form_type", "fiscal_year"];

pub struct FilingAgent {
    model: Arc<dyn TextGenerator>,
    corpus: Arc<dyn Corpus>,
    top_k: usize,
}

impl FilingAgent {
    pub fn new(model: Arc<dyn TextGenerator>, corpus: Arc<dyn Corpus>, top_k: usize) -> Self {
        Self { model, corpus, top_k }
    }

    pub async fn retrieve(&self, query: &str, filters: &Filters) -> Result<Vec<RetrievedContext>> {
        let search_filters: Filters = filters
            .iter()
            .filter(|(key, _)| CORPUS_FILTER_KEYS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let filters = (!search_filters.is_empty()).then_some(&search_filters);
        let passages = self.corpus.search(query, self.top_k, filters).await?;

        Ok(passages
            .into_iter()
            .map(|p| {
                let mut ctx = RetrievedContext::new(p.chunk.document_id, p.chunk.text, p.score);
                ctx.metadata = p.chunk.metadata;
                ctx.with_metadata(SOURCE_TYPE_KEY, SourceType::SecFiling.as_str())
            })
            .collect())
    }

    pub async fn generate(
        &self,
        query: &str,
        contexts: &[RetrievedContext],
    ) -> Result<(String, Vec<Citation>)> {
        if contexts.is_empty() {
            return Ok((NO_FILING_DATA.to_string(), Vec::new()));
        }

        let prompt = format!(
            "Question: {}\n\nSources:\n{}\n\nAnswer the question using only the sources above. Cite using [Source N].",
            query,
            format_contexts(contexts)
        );

        let response = self.model.generate(&prompt, Some(SYSTEM_PROMPT), 0.3).await?;
        let citations = extract_citations(&response.content, contexts);

        Ok((response.content, citations))
    }
}

fn source_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[Source (\d+)\]").expect("valid source marker pattern"))
}

/// Map inline `[Source N]` markers back to the N-th context, in order of first
/// appearance, one citation per source id. Out-of-range markers are ignored.
pub fn extract_citations(response: &str, contexts: &[RetrievedContext]) -> Vec<Citation> {
    let mut seen = HashSet::new();

    source_marker()
        .captures_iter(response)
        .filter_map(|cap| cap[1].parse::<usize>().ok())
        .filter_map(|n| n.checked_sub(1).and_then(|idx| contexts.get(idx)))
        .filter(|ctx| seen.insert(ctx.source_id.clone()))
        .map(|ctx| Citation::from_context(SourceType::SecFiling, ctx))
        .collect()
}
