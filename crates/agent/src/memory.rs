//! Long-term memory
//!
//! A small store of free-text notes. The agent writes to it through the
//! `remember_info` tool and reads from it both on request and when building
//! the system prompt for a new turn.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Returned to the model when a recall finds nothing
pub const NO_MEMORIES: &str = "No relevant memories found.";

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("◆ MEMORY UNAVAILABLE: {0}")]
    Unavailable(String),

    #[error("◆ NOTHING TO REMEMBER")]
    Empty,
}

/// Note store
#[async_trait]
pub trait Memory: Send + Sync {
    /// Store `text`, returning the new note's id
    async fn remember(&self, text: &str) -> Result<String, MemoryError>;

    /// Up to `n_results` notes most relevant to `query`
    async fn recall(&self, query: &str, n_results: usize) -> Result<Vec<String>, MemoryError>;
}

/// Recall that degrades to "nothing found" when the store is down
pub async fn recall_or_empty(memory: &dyn Memory, query: &str, n_results: usize) -> Vec<String> {
    match memory.recall(query, n_results).await {
        Ok(found) => found,
        Err(e) => {
            warn!("◆ MEMORY RECALL FAILED: {}", e);
            Vec::new()
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    terms: HashSet<String>,
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// In-process memory ranked by keyword overlap
#[derive(Default)]
pub struct LocalMemory {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl LocalMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Memory for LocalMemory {
    async fn remember(&self, text: &str) -> Result<String, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::Empty);
        }
        let entry = MemoryEntry {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            terms: terms(text),
        };
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        debug!("◆ MEMORY STORED: {}", id);
        Ok(id)
    }

    async fn recall(&self, query: &str, n_results: usize) -> Result<Vec<String>, MemoryError> {
        let wanted = terms(query);
        if wanted.is_empty() || n_results == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut scored: Vec<(usize, &MemoryEntry)> = entries
            .iter()
            .map(|e| (e.terms.intersection(&wanted).count(), e))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Highest overlap first, newest first on ties
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.created_at.cmp(&a.1.created_at)));

        Ok(scored
            .into_iter()
            .take(n_results)
            .map(|(_, e)| e.text.clone())
            .collect())
    }
}
