//! Context builder for assembling agent prompts

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use kaien_provider::Message;

use crate::memory::{recall_or_empty, Memory};
use crate::tools::ToolRegistry;

/// Builds context (system prompt + messages) for the agent
pub struct ContextBuilder {
    workspace: PathBuf,
    memory: Option<Arc<dyn Memory>>,
    memory_results: usize,
    tool_summary: String,
}

impl ContextBuilder {
    /// Operator-provided prompt files read from the workspace root
    const BOOTSTRAP_FILES: &'static [&'static str] = &["PERSONA.md", "DIRECTIVE.md"];

    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            memory: None,
            memory_results: 2,
            tool_summary: String::new(),
        }
    }

    /// Recall up to `results` notes relevant to each user input
    pub fn with_memory(mut self, memory: Arc<dyn Memory>, results: usize) -> Self {
        self.memory = Some(memory);
        self.memory_results = results;
        self
    }

    /// Describe the enabled tools in the system prompt
    pub fn with_tools(mut self, registry: &ToolRegistry) -> Self {
        self.tool_summary = registry
            .list()
            .iter()
            .map(|d| format!("- {}: {}", d.name, d.description))
            .collect::<Vec<_>>()
            .join("\n");
        self
    }

    /// Build the system prompt for a turn started by `user_input`
    pub async fn build_system_prompt(&self, user_input: &str) -> String {
        let mut parts = vec![self.identity()];

        let bootstrap = self.load_bootstrap_files().await;
        if !bootstrap.is_empty() {
            parts.push(bootstrap);
        }

        if let Some(memory) = &self.memory {
            let recalled = recall_or_empty(memory.as_ref(), user_input, self.memory_results).await;
            if !recalled.is_empty() {
                debug!("◆ {} MEMORIES RECALLED", recalled.len());
                parts.push(format!("# Relevant memory\n\n{}", recalled.join("\n")));
            }
        }

        parts.join("\n\n---\n\n")
    }

    fn identity(&self) -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
        let tools = if self.tool_summary.is_empty() {
            "(none)"
        } else {
            self.tool_summary.as_str()
        };

        format!(
            r#"# Kaien

You are Kaien, a research and reconnaissance assistant. You work step by step:
decide on an action, call a tool, read its result, and continue until the task
is finished.

## Current Time
{}

## Workspace
{}

## Tools
{}

Call tools through the function-calling interface. If it is unavailable, reply
with a single JSON object in a ```json block:
{{"tool": "<tool name>", "args": {{...}}}}

Only run commands on hosts the user has authorized. Tool results arrive as
observations. When the task is complete, give your final answer and end the
message with the word DONE. For ordinary questions, just answer in text."#,
            now,
            self.workspace.display(),
            tools
        )
    }

    async fn load_bootstrap_files(&self) -> String {
        let mut parts = Vec::new();
        for filename in Self::BOOTSTRAP_FILES {
            let path = self.workspace.join(filename);
            if !path.exists() {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => parts.push(format!("## {}\n\n{}", filename, content.trim())),
                Err(e) => debug!("Failed to read {}: {}", filename, e),
            }
        }
        parts.join("\n\n")
    }

    /// System prompt, prior history, then the new user message
    pub async fn build_messages(&self, history: Vec<Message>, user_input: &str) -> Vec<Message> {
        let system_prompt = self.build_system_prompt(user_input).await;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(history);
        messages.push(Message::user(user_input));
        messages
    }
}
