//! Kaien agent core
//!
//! Tool-orchestration loop: interprets model responses, dispatches tool
//! invocations through a registry, runs shell tools inside a policy-guarded
//! sandbox and folds every result back into the conversation.

use thiserror::Error;

pub mod context;
pub mod interpreter;
pub mod loop_agent;
pub mod memory;
pub mod policy;
pub mod sandbox;
pub mod session;
pub mod tools;

pub use context::ContextBuilder;
pub use interpreter::{extract, interpret, Interpretation, ToolInvocation};
pub use loop_agent::{AgentLoop, LoopState, TurnEnd, TurnOutcome};
pub use memory::{LocalMemory, Memory, MemoryError};
pub use policy::CommandPolicy;
pub use sandbox::{ExecStatus, ExecutionResult, SandboxExecutor};
pub use session::Session;
pub use tools::{ArgSpec, ArgType, ToolDescriptor, ToolRegistry, ToolTrait};

/// Agent errors.
///
/// Everything except `ResourceExhausted` is recoverable: the loop turns it
/// into an observation the model can react to.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("◆ POLICY DENIED: {0}")]
    PolicyDenied(String),

    #[error("◆ TOOL NOT FOUND: {0}")]
    ToolNotFound(String),

    #[error("◆ TOOL DISABLED: {0}")]
    ToolDisabled(String),

    #[error("◆ INVALID ARGUMENTS: {0}")]
    InvalidArguments(String),

    #[error("◆ TIMEOUT AFTER {0} SECONDS")]
    ExecutionTimeout(u64),

    #[error("◆ EXECUTION FAILED: {0}")]
    ExecutionError(String),

    #[error("◆ MODEL UNAVAILABLE: {0}")]
    ModelUnavailable(String),

    #[error("◆ RESOURCES EXHAUSTED: {0}")]
    ResourceExhausted(String),

    #[error("◆ IO ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether this error must abort the whole turn
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::ResourceExhausted(_))
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
