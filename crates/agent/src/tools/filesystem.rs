//! TOOLKIT: Workspace file operations

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::path_utils::validate_workspace_path;
use super::{opt_str_arg, str_arg, ArgType, ToolArgs, ToolDescriptor, ToolTrait};
use crate::sandbox::truncate_output;
use crate::{AgentError, Result};

fn io_failure(path: &str, e: std::io::Error) -> AgentError {
    match e.kind() {
        ErrorKind::PermissionDenied => AgentError::PolicyDenied(format!("access denied: {}", path)),
        _ => AgentError::ExecutionError(format!("{}: {}", path, e)),
    }
}

const DEFAULT_MAX_OUTPUT: usize = 10_000;

/// Reads a text file inside the workspace
pub struct ReadFileTool {
    workspace: PathBuf,
    max_output: usize,
}

impl ReadFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            max_output: DEFAULT_MAX_OUTPUT,
        }
    }

    /// Cap returned content at `max_output` bytes
    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }
}

#[async_trait]
impl ToolTrait for ReadFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("read_file", "Read a text file from the workspace.").required(
            "path",
            ArgType::String,
            "File path, relative to the workspace",
        )
    }

    async fn execute(&self, args: ToolArgs, _cancel: &CancellationToken) -> Result<String> {
        let raw = str_arg(&args, "path")?;
        let path = validate_workspace_path(raw, &self.workspace).await?;

        debug!("◆ READING: {:?}", path);
        if !path.exists() {
            return Err(AgentError::ExecutionError(format!("no such file: {}", raw)));
        }
        if !path.is_file() {
            return Err(AgentError::ExecutionError(format!("not a file: {}", raw)));
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_failure(raw, e))?;
        Ok(truncate_output(&content, self.max_output))
    }
}

/// Writes a text file inside the workspace, creating parent directories
pub struct WriteFileTool {
    workspace: PathBuf,
}

impl WriteFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolTrait for WriteFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "write_file",
            "Write text to a file in the workspace. Overwrites existing files.",
        )
        .required("path", ArgType::String, "File path, relative to the workspace")
        .required("content", ArgType::String, "Text to write")
    }

    async fn execute(&self, args: ToolArgs, _cancel: &CancellationToken) -> Result<String> {
        let raw = str_arg(&args, "path")?;
        let content = str_arg(&args, "content")?;
        let path = validate_workspace_path(raw, &self.workspace).await?;

        debug!("◆ WRITING: {:?}", path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure(raw, e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| io_failure(raw, e))?;
        Ok(format!("◆ {} BYTES WRITTEN TO {}", content.len(), raw))
    }
}

/// Lists a workspace directory
pub struct ListFilesTool {
    workspace: PathBuf,
}

impl ListFilesTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolTrait for ListFilesTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("list_files", "List the contents of a workspace directory.").optional(
            "path",
            ArgType::String,
            "Directory, relative to the workspace (default: workspace root)",
        )
    }

    async fn execute(&self, args: ToolArgs, _cancel: &CancellationToken) -> Result<String> {
        let raw = opt_str_arg(&args, "path").unwrap_or(".");
        let path = validate_workspace_path(raw, &self.workspace).await?;

        debug!("◆ LISTING: {:?}", path);
        if !path.is_dir() {
            return Err(AgentError::ExecutionError(format!("not a directory: {}", raw)));
        }
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| io_failure(raw, e))?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let prefix = if entry.file_type().await?.is_dir() {
                "[DIR] "
            } else {
                "[FILE] "
            };
            items.push(format!("{}{}", prefix, name));
        }
        items.sort();
        if items.is_empty() {
            Ok(format!("◆ EMPTY DIRECTORY: {}", raw))
        } else {
            Ok(items.join("\n"))
        }
    }
}
