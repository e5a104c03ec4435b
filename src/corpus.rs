//! Searchable filing corpus
//!
//! The filing agent only needs "search by text and filters, get scored
//! passages back". Ingestion is a separate, explicit operation and is never
//! triggered from a query.

use crate::models::Filters;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One ingested chunk of a filing document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingChunk {
    pub document_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Filters,
}

impl FilingChunk {
    pub fn new(document_id: &str, text: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            text: text.to_string(),
            metadata: Filters::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .insert(key.to_string(), serde_json::Value::String(value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub chunk: FilingChunk,
    pub score: f64,
}

/// Read-only search handle shared across queries.
#[async_trait]
pub trait Corpus: Send + Sync {
    /// Passages ordered by descending relevance, at most `top_k` of them.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<ScoredPassage>>;
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "and", "or", "is", "are", "was", "what", "which",
    "how", "in", "on", "for", "to", "its", "it", "s", "do", "does", "with",
];

/// Lexical in-memory corpus for development and tests.
pub struct InMemoryCorpus {
    chunks: Arc<RwLock<Vec<FilingChunk>>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add chunks to the corpus. Returns the new chunk count.
    pub async fn ingest(&self, chunks: Vec<FilingChunk>) -> usize {
        let mut stored = self.chunks.write().await;
        stored.extend(chunks);
        stored.len()
    }

    /// Ingest a JSON array of [`FilingChunk`]s from disk.
    pub async fn ingest_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let chunks: Vec<FilingChunk> = serde_json::from_str(&raw)?;
        let loaded = chunks.len();
        let total = self.ingest(chunks).await;
        info!(path = %path.as_ref().display(), loaded, total, "Corpus file ingested");
        Ok(total)
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

impl Default for InMemoryCorpus {
    fn default() -> Self {
        Self::new()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn matches_filters(chunk: &FilingChunk, filters: Option<&Filters>) -> bool {
    filters.map_or(true, |filters| {
        filters
            .iter()
            .all(|(key, expected)| chunk.metadata.get(key) == Some(expected))
    })
}

#[async_trait]
impl Corpus for InMemoryCorpus {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<ScoredPassage>> {
        let query_terms = terms(query);
        if query_terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().await;

        let mut scored: Vec<ScoredPassage> = chunks
            .iter()
            .filter(|chunk| matches_filters(chunk, filters))
            .filter_map(|chunk| {
                let chunk_terms = terms(&chunk.text);
                let hits = query_terms.intersection(&chunk_terms).count();
                if hits == 0 {
                    return None;
                }
                Some(ScoredPassage {
                    chunk: chunk.clone(),
                    score: hits as f64 / query_terms.len() as f64,
                })
            })
            .collect();

        // Stable sort keeps ingestion order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);

        debug!(hits = scored.len(), "Corpus search completed");

        Ok(scored)
    }
}
