//! Shared helpers for agent integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use kaien_agent::tools::{ArgType, ToolArgs, ToolDescriptor, ToolTrait};
use kaien_agent::{AgentError, Memory, MemoryError, Result};
use kaien_provider::{ChatParams, ChatResponse, Provider, ProviderError};

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, params: ChatParams) -> std::result::Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

mock! {
    pub Memory {}

    #[async_trait]
    impl Memory for Memory {
        async fn remember(&self, text: &str) -> std::result::Result<String, MemoryError>;
        async fn recall(&self, query: &str, n_results: usize) -> std::result::Result<Vec<String>, MemoryError>;
    }
}

/// Tool that counts its invocations and echoes its `value` argument
#[derive(Clone, Default)]
pub struct CountingTool {
    pub calls: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolTrait for CountingTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("count", "Count invocations").optional(
            "value",
            ArgType::String,
            "Echoed back",
        )
    }

    async fn execute(&self, args: ToolArgs, _cancel: &CancellationToken) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let value = args.get("value").and_then(|v| v.as_str()).unwrap_or("");
        Ok(format!("call #{} {}", n, value).trim().to_string())
    }
}

/// Tool that always fails with the given error
pub struct FailingTool {
    pub fatal: bool,
}

#[async_trait]
impl ToolTrait for FailingTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("fail", "Always fails")
    }

    async fn execute(&self, _args: ToolArgs, _cancel: &CancellationToken) -> Result<String> {
        if self.fatal {
            Err(AgentError::ResourceExhausted("fork: EAGAIN".into()))
        } else {
            Err(AgentError::ExecutionError("boom".into()))
        }
    }
}

/// Model that answers only after `delay`
pub struct SlowProvider {
    pub delay: Duration,
}

#[async_trait]
impl Provider for SlowProvider {
    async fn chat(&self, _params: ChatParams) -> std::result::Result<ChatResponse, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(ChatResponse::text("too late"))
    }

    fn default_model(&self) -> String {
        "slow-model".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Cancel `token` after `delay`
pub fn cancel_after(token: &CancellationToken, delay: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

/// Whether `pid` has exited (gone or zombie)
#[cfg(target_os = "linux")]
pub fn process_gone(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Err(_) => true,
        // Field after the parenthesised command name is the state
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .map(|state| state == "Z" || state == "X")
            .unwrap_or(false),
    }
}
