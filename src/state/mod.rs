//! Conversation checkpoints
//!
//! Each completed query appends one checkpoint to its conversation's
//! lineage. Currently in-memory; the trait is the seam for a durable store.

use crate::models::{FinalResponse, Intent};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: Uuid,
    pub conversation_id: String,
    pub query: String,
    pub intent: Intent,
    pub response: FinalResponse,
    pub created_at: DateTime<Utc>,
    /// SHA-256 over the query, intent and response
    pub context_hash: String,
}

impl Checkpoint {
    pub fn new(
        conversation_id: &str,
        query: &str,
        intent: Intent,
        response: FinalResponse,
    ) -> Result<Self> {
        let context_hash = compute_context_hash(&(query, intent, &response))?;
        Ok(Self {
            checkpoint_id: Uuid::new_v4(),
            conversation_id: conversation_id.to_string(),
            query: query.to_string(),
            intent,
            response,
            created_at: Utc::now(),
            context_hash,
        })
    }
}

/// Trait for checkpoint persistence
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Checkpoints of one conversation, oldest first.
    async fn history(&self, conversation_id: &str) -> Result<Vec<Checkpoint>>;

    async fn latest(&self, conversation_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.history(conversation_id).await?.pop())
    }
}

/// Checkpoints kept per conversation before the oldest are evicted.
pub const DEFAULT_MAX_CHECKPOINTS_PER_CONVERSATION: usize = 100;

/// In-memory state store for development.
///
/// Each conversation keeps at most `max_per_conversation` checkpoints, oldest
/// evicted first. The number of conversations is not bounded and nothing
/// survives a restart.
pub struct InMemoryStateStore {
    checkpoints: Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>,
    max_per_conversation: usize,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::with_max_per_conversation(DEFAULT_MAX_CHECKPOINTS_PER_CONVERSATION)
    }

    /// A cap of zero is treated as one.
    pub fn with_max_per_conversation(max_per_conversation: usize) -> Self {
        Self {
            checkpoints: Arc::new(RwLock::new(HashMap::new())),
            max_per_conversation: max_per_conversation.max(1),
        }
    }

    pub async fn conversation_count(&self) -> usize {
        self.checkpoints.read().await.len()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().await;
        let lineage = checkpoints
            .entry(checkpoint.conversation_id.clone())
            .or_default();
        lineage.push(checkpoint);

        if lineage.len() > self.max_per_conversation {
            let excess = lineage.len() - self.max_per_conversation;
            lineage.drain(..excess);
            debug!(evicted = excess, "Evicted oldest checkpoints");
        }
        Ok(())
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(conversation_id).cloned().unwrap_or_default())
    }
}

/// Hex SHA-256 of the value's JSON encoding.
pub fn compute_context_hash<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    serde_json::to_writer(&mut HashWriter(&mut hasher), value)?;

    Ok(hex::encode(hasher.finalize()))
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
