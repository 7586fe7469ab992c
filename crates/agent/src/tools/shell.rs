//! TOOLKIT: Terminal operations

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::path_utils::validate_workspace_path;
use super::{opt_str_arg, opt_u64_arg, str_arg, ArgType, ToolArgs, ToolDescriptor, ToolTrait};
use crate::policy::CommandPolicy;
use crate::sandbox::{ExecStatus, SandboxError, SandboxExecutor};
use crate::{AgentError, Result};

/// Run `command` through `executor` and map the outcome onto a tool result.
///
/// Completed runs (any exit code) become output; denial, timeout and
/// execution faults become the matching [`AgentError`].
pub(crate) async fn run_sandboxed(
    executor: &SandboxExecutor,
    command: &str,
    timeout: Duration,
    cwd: Option<&Path>,
    max_output: usize,
    cancel: &CancellationToken,
) -> Result<String> {
    let result = executor
        .try_run(command, timeout, cwd, cancel)
        .await
        .map_err(|SandboxError::ResourceExhausted(msg)| AgentError::ResourceExhausted(msg))?;

    let detail = result.detail.clone().unwrap_or_default();
    match result.status {
        ExecStatus::Ok => Ok(result.render(max_output)),
        ExecStatus::Denied => Err(AgentError::PolicyDenied(detail)),
        ExecStatus::Timeout => Err(AgentError::ExecutionTimeout(timeout.as_secs())),
        ExecStatus::Error => Err(AgentError::ExecutionError(detail)),
    }
}

/// General shell tool limited to administrative helpers
pub struct ExecTool {
    executor: SandboxExecutor,
    timeout: Duration,
    workspace: PathBuf,
    max_output: usize,
}

impl ExecTool {
    pub fn new(policy: CommandPolicy, timeout: Duration, workspace: PathBuf, max_output: usize) -> Self {
        Self {
            executor: SandboxExecutor::new(policy),
            timeout,
            workspace,
            max_output,
        }
    }

    pub fn with_workspace(workspace: PathBuf) -> Self {
        Self::new(CommandPolicy::shell(), Duration::from_secs(60), workspace, 10_000)
    }

    /// Requested timeout, never above the configured limit
    fn effective_timeout(&self, requested: Option<u64>) -> Duration {
        match requested {
            Some(secs) if secs > 0 => self.timeout.min(Duration::from_secs(secs)),
            _ => self.timeout,
        }
    }
}

#[async_trait]
impl ToolTrait for ExecTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "execute_shell",
            format!(
                "Run a shell command in the workspace. Allowed commands: {}.",
                self.executor.policy().describe()
            ),
        )
        .required("command", ArgType::String, "Command line to run")
        .optional("cwd", ArgType::String, "Working directory inside the workspace")
        .optional(
            "timeout",
            ArgType::Integer,
            "Timeout in seconds (capped by configuration)",
        )
    }

    async fn execute(&self, args: ToolArgs, cancel: &CancellationToken) -> Result<String> {
        let command = str_arg(&args, "command")?;
        let cwd = match opt_str_arg(&args, "cwd") {
            Some(dir) => validate_workspace_path(dir, &self.workspace).await?,
            None => {
                tokio::fs::create_dir_all(&self.workspace).await?;
                self.workspace.clone()
            }
        };
        let timeout = self.effective_timeout(opt_u64_arg(&args, "timeout"));

        run_sandboxed(
            &self.executor,
            command,
            timeout,
            Some(&cwd),
            self.max_output,
            cancel,
        )
        .await
    }
}
