//! TOOLKIT: Reconnaissance commands

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::shell::run_sandboxed;
use super::{str_arg, ArgType, ToolArgs, ToolDescriptor, ToolTrait};
use crate::policy::CommandPolicy;
use crate::sandbox::SandboxExecutor;
use crate::Result;

/// Network reconnaissance with a short fixed timeout
pub struct OsintTool {
    executor: SandboxExecutor,
    timeout: Duration,
    max_output: usize,
}

impl OsintTool {
    pub fn new(policy: CommandPolicy, timeout: Duration, max_output: usize) -> Self {
        Self {
            executor: SandboxExecutor::new(policy),
            timeout,
            max_output,
        }
    }
}

impl Default for OsintTool {
    fn default() -> Self {
        Self::new(CommandPolicy::osint(), Duration::from_secs(15), 10_000)
    }
}

#[async_trait]
impl ToolTrait for OsintTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "run_osint_command",
            format!(
                "Run a reconnaissance command (e.g. 'ping -c 4 127.0.0.1', 'whois example.com'). \
                 Allowed commands: {}. Limit {}s.",
                self.executor.policy().describe(),
                self.timeout.as_secs()
            ),
        )
        .required("command", ArgType::String, "Command line to run")
    }

    async fn execute(&self, args: ToolArgs, cancel: &CancellationToken) -> Result<String> {
        let command = str_arg(&args, "command")?;
        run_sandboxed(
            &self.executor,
            command,
            self.timeout,
            None,
            self.max_output,
            cancel,
        )
        .await
    }
}
