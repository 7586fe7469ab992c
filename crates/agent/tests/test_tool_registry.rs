//! Tests for tool registry

mod common;

use common::CountingTool;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use kaien_agent::tools::{
    default_registry, ArgType, ExecTool, ListFilesTool, OsintTool, ReadFileTool, SystemInfoTool,
    ToolDescriptor, ToolRegistry, WriteFileTool,
};
use kaien_agent::{AgentError, LocalMemory};
use kaien_config::Config;

#[test]
fn test_registry_new() {
    let registry = ToolRegistry::new();
    assert!(registry.names().is_empty());
    assert!(registry.definitions().is_empty());
}

#[test]
fn test_registry_lists_in_registration_order() {
    let mut registry = ToolRegistry::new();
    registry.register(SystemInfoTool);
    registry.register(ReadFileTool::new(PathBuf::from("/tmp")));
    registry.register(ListFilesTool::new(PathBuf::from("/tmp")));

    assert_eq!(registry.names(), vec!["system_info", "read_file", "list_files"]);
    assert!(registry.has("read_file"));
    assert!(!registry.has("nonexistent"));
}

#[test]
fn test_registry_overwrite_keeps_position() {
    let mut registry = ToolRegistry::new();
    assert!(!registry.register(SystemInfoTool));
    assert!(!registry.register(CountingTool::default()));

    let replacement = ToolDescriptor::new("system_info", "Replaced");
    assert!(registry.register_with(replacement, CountingTool::default()));

    assert_eq!(registry.names(), vec!["system_info", "count"]);
    assert_eq!(
        registry.get("system_info").unwrap().descriptor().description,
        "Replaced"
    );
}

#[test]
fn test_definitions_schema() {
    let registry = ToolRegistry::builder()
        .tool(OsintTool::default())
        .build();
    let definitions = registry.definitions();

    assert_eq!(definitions.len(), 1);
    let def = &definitions[0];
    assert_eq!(def.tool_type, "function");
    assert_eq!(def.function.name, "run_osint_command");
    assert!(def.function.description.contains("nmap"));
    assert_eq!(def.function.parameters["required"], json!(["command"]));
    assert_eq!(
        def.function.parameters["properties"]["command"]["type"],
        "string"
    );
}

#[tokio::test]
async fn test_execute_not_found() {
    let registry = ToolRegistry::builder().tool(SystemInfoTool).build();
    let err = registry
        .execute("nonexistent", json!({}), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        AgentError::ToolNotFound(msg) => {
            assert!(msg.contains("nonexistent"));
            assert!(msg.contains("system_info"));
        }
        other => panic!("Expected ToolNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disabled_tool_is_hidden_and_refused() {
    let tool = CountingTool::default();
    let registry = ToolRegistry::builder()
        .tool(SystemInfoTool)
        .tool(tool.clone())
        .disable(&["count"])
        .build();

    assert!(registry.has("count"));
    assert_eq!(registry.names(), vec!["system_info"]);

    let err = registry
        .execute("count", json!({}), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ToolDisabled(_)));
    assert_eq!(tool.count(), 0);
}

#[tokio::test]
async fn test_validation_failure_skips_capability() {
    let tool = CountingTool::default();
    let descriptor = ToolDescriptor::new("strict", "Needs a target").required(
        "target",
        ArgType::String,
        "Host",
    );
    let registry = ToolRegistry::builder()
        .tool_with(descriptor, tool.clone())
        .build();
    let cancel = CancellationToken::new();

    let err = registry
        .execute("strict", json!({}), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidArguments(_)));

    let err = registry
        .execute("strict", json!({"target": ["a"]}), &cancel)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must be string, got array"));
    assert_eq!(tool.count(), 0);

    registry
        .execute("strict", json!({"target": "a"}), &cancel)
        .await
        .unwrap();
    assert_eq!(tool.count(), 1);
}

fn config_for(workspace: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.agent.workspace = workspace.to_string_lossy().to_string();
    config
}

#[test]
fn test_default_registry_tool_set() {
    let temp = tempfile::TempDir::new().unwrap();
    let registry = default_registry(&config_for(temp.path()), Arc::new(LocalMemory::new()));

    assert_eq!(
        registry.names(),
        vec![
            "system_info",
            "remember_info",
            "recall_info",
            "run_osint_command",
            "execute_shell",
            "read_file",
            "write_file",
            "list_files",
        ]
    );
}

#[test]
fn test_default_registry_respects_allow_shell() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut config = config_for(temp.path());
    config.sandbox.allow_shell = false;
    config.tools.disabled = vec!["system_info".to_string()];

    let registry = default_registry(&config, Arc::new(LocalMemory::new()));
    let names = registry.names();

    assert!(!names.contains(&"execute_shell".to_string()));
    assert!(!names.contains(&"write_file".to_string()));
    assert!(!names.contains(&"system_info".to_string()));
    assert!(names.contains(&"run_osint_command".to_string()));
    assert!(registry.has("execute_shell"));
}

#[tokio::test]
async fn test_shell_tool_runs_in_workspace() {
    let temp = tempfile::TempDir::new().unwrap();
    let registry = ToolRegistry::builder()
        .tool(ExecTool::with_workspace(temp.path().to_path_buf()))
        .build();

    let output = registry
        .execute(
            "execute_shell",
            json!({"command": "pwd"}),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let expected = temp.path().canonicalize().unwrap();
    assert!(
        output.contains(expected.to_str().unwrap()) || output.contains(temp.path().to_str().unwrap()),
        "unexpected cwd: {}",
        output
    );
}

#[tokio::test]
async fn test_shell_tool_rejects_cwd_outside_workspace() {
    let workspace = tempfile::TempDir::new().unwrap();
    let elsewhere = tempfile::TempDir::new().unwrap();
    let registry = ToolRegistry::builder()
        .tool(ExecTool::with_workspace(workspace.path().to_path_buf()))
        .build();

    let err = registry
        .execute(
            "execute_shell",
            json!({"command": "pwd", "cwd": elsewhere.path().to_str().unwrap()}),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("is outside workspace"));
}

#[tokio::test]
async fn test_shell_tool_denies_unlisted_command() {
    let temp = tempfile::TempDir::new().unwrap();
    let registry = ToolRegistry::builder()
        .tool(ExecTool::with_workspace(temp.path().to_path_buf()))
        .build();

    let err = registry
        .execute(
            "execute_shell",
            json!({"command": "nmap -F 127.0.0.1"}),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::PolicyDenied(_)));
}

#[tokio::test]
async fn test_write_then_read_through_registry() {
    let temp = tempfile::TempDir::new().unwrap();
    let workspace = temp.path().to_path_buf();
    let registry = ToolRegistry::builder()
        .tool(WriteFileTool::new(workspace.clone()))
        .tool(ReadFileTool::new(workspace))
        .build();
    let cancel = CancellationToken::new();

    let written = registry
        .execute(
            "write_file",
            json!({"path": "notes/target.txt", "content": "open: 22, 443"}),
            &cancel,
        )
        .await
        .unwrap();
    assert!(written.contains("13 BYTES WRITTEN"));

    let read = registry
        .execute("read_file", json!({"path": "notes/target.txt"}), &cancel)
        .await
        .unwrap();
    assert_eq!(read, "open: 22, 443");
}
