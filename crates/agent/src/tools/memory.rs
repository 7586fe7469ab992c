//! TOOLKIT: Long-term memory access

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{opt_u64_arg, str_arg, ArgType, ToolArgs, ToolDescriptor, ToolTrait};
use crate::memory::{recall_or_empty, Memory, MemoryError, NO_MEMORIES};
use crate::{AgentError, Result};

fn memory_failure(e: MemoryError) -> AgentError {
    match e {
        MemoryError::Empty => AgentError::InvalidArguments(e.to_string()),
        MemoryError::Unavailable(_) => AgentError::ExecutionError(e.to_string()),
    }
}

/// Stores a note
pub struct RememberTool {
    memory: Arc<dyn Memory>,
}

impl RememberTool {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl ToolTrait for RememberTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "remember_info",
            "Save important information or research notes to long-term memory.",
        )
        .required("text", ArgType::String, "Text to store")
    }

    async fn execute(&self, args: ToolArgs, _cancel: &CancellationToken) -> Result<String> {
        let text = str_arg(&args, "text")?;
        let id = self.memory.remember(text).await.map_err(memory_failure)?;
        Ok(format!("Stored in memory (ID: {})", id))
    }
}

/// Searches stored notes. An unreachable store reads as an empty one.
pub struct RecallTool {
    memory: Arc<dyn Memory>,
    default_results: usize,
}

impl RecallTool {
    pub fn new(memory: Arc<dyn Memory>, default_results: usize) -> Self {
        Self {
            memory,
            default_results,
        }
    }
}

#[async_trait]
impl ToolTrait for RecallTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "recall_info",
            "Search long-term memory for notes relevant to a query.",
        )
        .required("query", ArgType::String, "What to look for")
        .optional("limit", ArgType::Integer, "Maximum number of notes")
    }

    async fn execute(&self, args: ToolArgs, _cancel: &CancellationToken) -> Result<String> {
        let query = str_arg(&args, "query")?;
        let limit = opt_u64_arg(&args, "limit")
            .map(|n| n as usize)
            .unwrap_or(self.default_results);
        let found = recall_or_empty(self.memory.as_ref(), query, limit).await;
        if found.is_empty() {
            Ok(NO_MEMORIES.to_string())
        } else {
            Ok(found.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LocalMemory;
    use serde_json::json;

    fn args(value: serde_json::Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_remember_then_recall() {
        let memory: Arc<dyn Memory> = Arc::new(LocalMemory::new());
        let cancel = CancellationToken::new();
        let remember = RememberTool::new(memory.clone());
        let recall = RecallTool::new(memory, 2);

        let stored = remember
            .execute(args(json!({"text": "mail server is mx1.example.com"})), &cancel)
            .await
            .unwrap();
        assert!(stored.starts_with("Stored in memory (ID: "));

        let found = recall
            .execute(args(json!({"query": "mail server"})), &cancel)
            .await
            .unwrap();
        assert_eq!(found, "mail server is mx1.example.com");
    }

    #[tokio::test]
    async fn test_recall_empty_store() {
        let recall = RecallTool::new(Arc::new(LocalMemory::new()), 2);
        let found = recall
            .execute(args(json!({"query": "anything"})), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found, NO_MEMORIES);
    }

    #[tokio::test]
    async fn test_remember_blank_is_invalid() {
        let remember = RememberTool::new(Arc::new(LocalMemory::new()));
        let err = remember
            .execute(args(json!({"text": " "})), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments(_)));
    }
}
