//! Sandboxed command execution
//!
//! Runs allow-listed commands under `sh -c` in their own process group with
//! a hard wall-clock limit. On timeout or cancellation the whole group is
//! killed and the direct child reaped before returning. A command that
//! exits while background jobs still hold its output open completes
//! normally; the leftovers are killed.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::policy::{base_command, CommandPolicy};

/// Outcome class of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStatus {
    Ok,
    Denied,
    Timeout,
    Error,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Ok => "ok",
            ExecStatus::Denied => "denied",
            ExecStatus::Timeout => "timeout",
            ExecStatus::Error => "error",
        }
    }
}

/// Result of one execution.
///
/// `stdout`/`stderr` only ever hold bytes read from a real process; denial,
/// timeout and fault explanations go to `detail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub detail: Option<String>,
}

impl ExecutionResult {
    fn without_output(status: ExecStatus, detail: String) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            detail: Some(detail),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::without_output(ExecStatus::Denied, reason.into())
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::without_output(
            ExecStatus::Timeout,
            format!("command timed out (limit {}s)", limit.as_secs()),
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::without_output(ExecStatus::Error, message.into())
    }

    fn completed(stdout: &[u8], stderr: &[u8], status: ExitStatus) -> Self {
        Self {
            status: ExecStatus::Ok,
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
            exit_code: status.code(),
            detail: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecStatus::Ok
    }

    /// Observation text for a completed run, truncated to `max_bytes`
    pub fn render(&self, max_bytes: usize) -> String {
        let mut parts = Vec::new();
        if !self.stdout.is_empty() {
            parts.push(self.stdout.clone());
        }
        if !self.stderr.is_empty() {
            parts.push(format!("STDERR:\n{}", self.stderr));
        }
        match (self.status, self.exit_code) {
            (ExecStatus::Ok, Some(0)) => {}
            (ExecStatus::Ok, Some(code)) => parts.push(format!("EXIT CODE: {}", code)),
            (ExecStatus::Ok, None) => parts.push("EXIT CODE: (terminated by signal)".to_string()),
            (status, _) => parts.push(format!(
                "◆ {}: {}",
                status.as_str().to_uppercase(),
                self.detail.as_deref().unwrap_or("")
            )),
        }
        let result = if parts.is_empty() {
            "(NO OUTPUT)".to_string()
        } else {
            parts.join("\n")
        };
        truncate_output(&result, max_bytes)
    }
}

/// Cut `text` to at most `max_bytes` on a char boundary, noting the remainder
pub fn truncate_output(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n◆ OUTPUT TRUNCATED: {} BYTES REMAINING",
        &text[..cut],
        text.len() - cut
    )
}

/// Infrastructure failures that must not be folded into a tool result
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("cannot spawn process: {0}")]
    ResourceExhausted(String),
}

/// How long output pipes may stay open after the direct child exits
const DRAIN_GRACE: Duration = Duration::from_millis(500);

enum Outcome {
    Finished(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Policy-guarded command runner. Holds no per-call state.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    policy: CommandPolicy,
}

impl SandboxExecutor {
    pub fn new(policy: CommandPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    /// Run `command`; never fails
    pub async fn run(&self, command: &str, timeout: Duration, cwd: Option<&Path>) -> ExecutionResult {
        self.run_cancellable(command, timeout, cwd, &CancellationToken::new())
            .await
    }

    /// Run `command`, killing it early if `cancel` fires; never fails
    pub async fn run_cancellable(
        &self,
        command: &str,
        timeout: Duration,
        cwd: Option<&Path>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        match self.try_run(command, timeout, cwd, cancel).await {
            Ok(result) => result,
            Err(e) => ExecutionResult::error(e.to_string()),
        }
    }

    /// Like [`run_cancellable`](Self::run_cancellable) but reports spawn
    /// failures caused by resource exhaustion as `Err`.
    pub async fn try_run(
        &self,
        command: &str,
        timeout: Duration,
        cwd: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        if !self.policy.is_permitted(command) {
            let base = base_command(command).unwrap_or("");
            warn!("◆ BLOCKED COMMAND: {:?}", base);
            return Ok(ExecutionResult::denied(format!(
                "command '{}' is not in the allowed list ({})",
                base,
                self.policy.describe()
            )));
        }

        debug!("◆ EXECUTING: {}", command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if is_resource_exhaustion(&e) => {
                return Err(SandboxError::ResourceExhausted(e.to_string()))
            }
            Err(e) => return Ok(ExecutionResult::error(format!("spawn failed: {}", e))),
        };

        let pid = child.id();
        let out_reader = tokio::spawn(read_stream(child.stdout.take()));
        let err_reader = tokio::spawn(read_stream(child.stderr.take()));

        let outcome = tokio::select! {
            res = child.wait() => Outcome::Finished(res),
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let result = match outcome {
            Outcome::Finished(Ok(status)) => {
                info!("◆ COMMAND COMPLETED: exit={:?}", status.code());
                match drain(pid, out_reader, err_reader).await {
                    Ok((out, err)) => ExecutionResult::completed(&out, &err, status),
                    Err(e) => {
                        ExecutionResult::error(format!("I/O error while reading output: {}", e))
                    }
                }
            }
            Outcome::Finished(Err(e)) => {
                terminate(&mut child).await;
                out_reader.abort();
                err_reader.abort();
                ExecutionResult::error(format!("I/O error while running command: {}", e))
            }
            Outcome::TimedOut => {
                terminate(&mut child).await;
                out_reader.abort();
                err_reader.abort();
                warn!("◆ COMMAND TIMED OUT AFTER {:?}: {}", timeout, command);
                ExecutionResult::timeout(timeout)
            }
            Outcome::Cancelled => {
                terminate(&mut child).await;
                out_reader.abort();
                err_reader.abort();
                info!("◆ COMMAND CANCELLED: {}", command);
                ExecutionResult::error("command cancelled")
            }
        };
        Ok(result)
    }
}

/// Collect output after the direct child exited.
///
/// Background processes that inherited the pipes may keep them open. They
/// get [`DRAIN_GRACE`] to finish, then the group is killed and whatever was
/// read so far is kept.
async fn drain(
    pid: Option<u32>,
    out_reader: JoinHandle<io::Result<Vec<u8>>>,
    err_reader: JoinHandle<io::Result<Vec<u8>>>,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let readers = join_readers(out_reader, err_reader);
    tokio::pin!(readers);

    let drained = match tokio::time::timeout(DRAIN_GRACE, &mut readers).await {
        Ok(res) => res,
        Err(_) => {
            debug!("◆ OUTPUT STILL OPEN AFTER EXIT, KILLING LEFTOVER PROCESSES");
            if let Some(pid) = pid {
                kill_group(pid);
            }
            match tokio::time::timeout(DRAIN_GRACE, &mut readers).await {
                Ok(res) => res,
                Err(_) => {
                    warn!("◆ OUTPUT PIPES HELD OPEN OUTSIDE THE PROCESS GROUP");
                    Ok((Vec::new(), Vec::new()))
                }
            }
        }
    };

    // Nothing started by the command outlives it
    if let Some(pid) = pid {
        kill_group(pid);
    }
    drained
}

async fn join_readers(
    out_reader: JoinHandle<io::Result<Vec<u8>>>,
    err_reader: JoinHandle<io::Result<Vec<u8>>>,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let (out, err) = tokio::join!(out_reader, err_reader);
    Ok((joined(out)?, joined(err)?))
}

fn joined(res: Result<io::Result<Vec<u8>>, JoinError>) -> io::Result<Vec<u8>> {
    res.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill the process group, then the child itself, and reap it
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!("◆ killpg({}) failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

fn is_resource_exhaustion(e: &io::Error) -> bool {
    // EAGAIN from fork surfaces as WouldBlock
    matches!(
        e.kind(),
        io::ErrorKind::OutOfMemory | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_output_respects_char_boundary() {
        let text = "aé".repeat(10);
        let cut = truncate_output(&text, 4);
        assert!(cut.starts_with("aéa"));
        assert!(cut.contains("OUTPUT TRUNCATED"));

        assert_eq!(truncate_output("short", 100), "short");
    }

    #[test]
    fn test_render_ok_output() {
        let result = ExecutionResult {
            status: ExecStatus::Ok,
            stdout: "hello\n".to_string(),
            stderr: "warn\n".to_string(),
            exit_code: Some(2),
            detail: None,
        };
        let rendered = result.render(1000);
        assert!(rendered.contains("hello"));
        assert!(rendered.contains("STDERR:\nwarn"));
        assert!(rendered.contains("EXIT CODE: 2"));
    }

    #[test]
    fn test_render_empty_success() {
        let result = ExecutionResult {
            status: ExecStatus::Ok,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            detail: None,
        };
        assert_eq!(result.render(1000), "(NO OUTPUT)");
    }

    #[test]
    fn test_denied_and_timeout_carry_no_output() {
        let denied = ExecutionResult::denied("nope");
        assert_eq!(denied.status, ExecStatus::Denied);
        assert!(denied.stdout.is_empty() && denied.stderr.is_empty());
        assert!(denied.exit_code.is_none());
        assert_eq!(denied.render(100), "◆ DENIED: nope");

        let timeout = ExecutionResult::timeout(Duration::from_secs(15));
        assert_eq!(timeout.status, ExecStatus::Timeout);
        assert!(timeout.exit_code.is_none());
        assert!(timeout.detail.unwrap().contains("limit 15s"));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&ExecStatus::Timeout).unwrap(), "\"timeout\"");
    }

    #[test]
    fn test_resource_exhaustion_classification() {
        assert!(is_resource_exhaustion(&io::Error::from(io::ErrorKind::OutOfMemory)));
        assert!(is_resource_exhaustion(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_resource_exhaustion(&io::Error::from(io::ErrorKind::NotFound)));
    }
}
