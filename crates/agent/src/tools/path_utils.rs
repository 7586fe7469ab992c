//! Workspace confinement for file and working-directory arguments

use std::path::{Component, Path, PathBuf};

use kaien_config::expand_home;

use crate::{AgentError, Result};

/// Resolve `path` against `workspace_root` and require the result to stay
/// inside it.
///
/// Relative paths are joined onto the workspace, `~/` expands to home.
/// Existing paths are canonicalized so symlinks cannot point outside; for
/// new paths the nearest existing ancestor is canonicalized and the rest
/// is appended after lexical normalization.
pub async fn validate_workspace_path(path: &str, workspace_root: &Path) -> Result<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(AgentError::InvalidArguments("path must not be empty".into()));
    }

    let expanded = if trimmed.starts_with('/') || trimmed.starts_with('~') {
        expand_home(trimmed)
    } else {
        workspace_root.join(trimmed)
    };

    let workspace = canonical_or_self(workspace_root).await;
    let resolved = resolve(&normalize(&expanded)).await;

    if !resolved.starts_with(&workspace) {
        return Err(AgentError::PolicyDenied(format!(
            "path {} is outside workspace {}",
            path,
            workspace.display()
        )));
    }
    Ok(resolved)
}

async fn canonical_or_self(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| normalize(path))
}

/// Canonicalize the longest existing prefix and re-append the remainder
async fn resolve(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = tokio::fs::canonicalize(&existing).await {
            let mut out = canonical;
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Lexically fold `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
