//! Tool registry
//!
//! Maps tool names to capabilities plus their declared argument schemas.
//! Populated during startup, then shared read-only.

pub mod filesystem;
pub mod memory;
pub mod osint;
pub mod path_utils;
pub mod shell;
pub mod system;

pub use filesystem::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use memory::{RecallTool, RememberTool};
pub use osint::OsintTool;
pub use shell::ExecTool;
pub use system::SystemInfoTool;

use async_trait::async_trait;
use kaien_config::Config;
use kaien_provider::Tool;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::interpreter::ToolInvocation;
use crate::memory::Memory;
use crate::policy::CommandPolicy;
use crate::{AgentError, Result};

/// Validated tool arguments
pub type ToolArgs = Map<String, Value>;

/// Declared JSON type of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ArgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Integer => "integer",
            ArgType::Number => "number",
            ArgType::Boolean => "boolean",
            ArgType::Object => "object",
            ArgType::Array => "array",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ArgType::String => value.is_string(),
            ArgType::Integer => value.is_i64() || value.is_u64(),
            ArgType::Number => value.is_number(),
            ArgType::Boolean => value.is_boolean(),
            ArgType::Object => value.is_object(),
            ArgType::Array => value.is_array(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared argument
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub arg_type: ArgType,
    pub description: String,
    pub required: bool,
}

/// Name, description, argument schema and enable flag of a tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgSpec>,
    pub enabled: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args: Vec::new(),
            enabled: true,
        }
    }

    fn arg(mut self, name: &str, arg_type: ArgType, description: &str, required: bool) -> Self {
        self.args.push(ArgSpec {
            name: name.to_string(),
            arg_type,
            description: description.to_string(),
            required,
        });
        self
    }

    pub fn required(self, name: &str, arg_type: ArgType, description: &str) -> Self {
        self.arg(name, arg_type, description, true)
    }

    pub fn optional(self, name: &str, arg_type: ArgType, description: &str) -> Self {
        self.arg(name, arg_type, description, false)
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// JSON schema of the arguments
    pub fn parameters(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for arg in &self.args {
            properties.insert(
                arg.name.clone(),
                json!({ "type": arg.arg_type.as_str(), "description": arg.description }),
            );
            if arg.required {
                required.push(Value::String(arg.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }

    pub fn to_provider_tool(&self) -> Tool {
        Tool::new(&self.name, &self.description, self.parameters())
    }

    /// Check `args` against the declared schema.
    ///
    /// Required arguments must be present and non-null, declared arguments
    /// must have the declared type. Null values are dropped; undeclared
    /// keys pass through untouched.
    pub fn validate(&self, args: &Value) -> Result<ToolArgs> {
        let mut map = match args {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(AgentError::InvalidArguments(format!(
                    "arguments for tool '{}' must be a JSON object, got {}",
                    self.name,
                    json_type_name(other)
                )))
            }
        };

        for spec in &self.args {
            let value = match map.get(&spec.name) {
                Some(Value::Null) | None => None,
                Some(value) => Some(value),
            };
            match value {
                None if spec.required => {
                    return Err(AgentError::InvalidArguments(format!(
                        "missing required argument '{}' for tool '{}'",
                        spec.name, self.name
                    )));
                }
                None => {}
                Some(value) if !spec.arg_type.matches(value) => {
                    return Err(AgentError::InvalidArguments(format!(
                        "argument '{}' for tool '{}' must be {}, got {}",
                        spec.name,
                        self.name,
                        spec.arg_type.as_str(),
                        json_type_name(value)
                    )));
                }
                Some(_) => {}
            }
        }
        map.retain(|_, v| !v.is_null());
        Ok(map)
    }
}

/// Required string argument (presence and type already validated)
pub(crate) fn str_arg<'a>(args: &'a ToolArgs, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidArguments(format!("missing string argument '{}'", name)))
}

pub(crate) fn opt_str_arg<'a>(args: &'a ToolArgs, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

pub(crate) fn opt_u64_arg(args: &ToolArgs, name: &str) -> Option<u64> {
    args.get(name).and_then(Value::as_u64)
}

/// A callable capability
#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;
    async fn execute(&self, args: ToolArgs, cancel: &CancellationToken) -> Result<String>;
}

/// Registry entry
pub struct RegisteredTool {
    descriptor: ToolDescriptor,
    tool: Arc<dyn ToolTrait>,
}

impl RegisteredTool {
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    pub fn tool(&self) -> &dyn ToolTrait {
        self.tool.as_ref()
    }
}

/// Name → capability map, listing in registration order
#[derive(Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Register under the tool's own descriptor. Returns `true` when an
    /// existing entry was overwritten.
    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) -> bool {
        let descriptor = tool.descriptor();
        self.register_with(descriptor, tool)
    }

    /// Register under an explicit descriptor (last write wins)
    pub fn register_with<T: ToolTrait + 'static>(
        &mut self,
        descriptor: ToolDescriptor,
        tool: T,
    ) -> bool {
        let name = descriptor.name.clone();
        let entry = RegisteredTool {
            descriptor,
            tool: Arc::new(tool),
        };
        let replaced = self.tools.insert(name.clone(), entry).is_some();
        if replaced {
            warn!("◆ TOOL '{}' ALREADY REGISTERED, OVERWRITING", name);
        } else {
            self.order.push(name.clone());
            debug!("◆ TOOL '{}' REGISTERED", name);
        }
        replaced
    }

    /// Flip the enable flag of a registered tool. Returns `false` if absent.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.tools.get_mut(name) {
            Some(entry) => {
                entry.descriptor.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Look up an enabled tool
    pub fn resolve(&self, name: &str) -> Result<&RegisteredTool> {
        match self.tools.get(name) {
            None => Err(AgentError::ToolNotFound(format!(
                "'{}' (available: {})",
                name,
                self.names().join(", ")
            ))),
            Some(entry) if !entry.descriptor.enabled => {
                Err(AgentError::ToolDisabled(name.to_string()))
            }
            Some(entry) => Ok(entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Registered, enabled or not
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Enabled descriptors in registration order
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|entry| &entry.descriptor)
            .filter(|d| d.enabled)
            .collect()
    }

    /// Schemas advertised to the model
    pub fn definitions(&self) -> Vec<Tool> {
        self.list()
            .into_iter()
            .map(ToolDescriptor::to_provider_tool)
            .collect()
    }

    /// Enabled tool names in registration order
    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|d| d.name.clone()).collect()
    }

    /// Resolve, validate, then run. The capability is never called when
    /// resolution or validation fails.
    pub async fn execute(&self, name: &str, args: Value, cancel: &CancellationToken) -> Result<String> {
        let entry = self.resolve(name)?;
        let args = entry.descriptor.validate(&args)?;
        debug!("◆ DISPATCHING TOOL: {}", name);
        entry.tool.execute(args, cancel).await
    }

    pub async fn invoke(&self, invocation: &ToolInvocation, cancel: &CancellationToken) -> Result<String> {
        self.execute(
            &invocation.name,
            Value::Object(invocation.args.clone()),
            cancel,
        )
        .await
    }
}

/// Explicit, ordered registry construction
#[derive(Default)]
pub struct ToolRegistryBuilder {
    registry: ToolRegistry,
}

impl ToolRegistryBuilder {
    pub fn tool<T: ToolTrait + 'static>(mut self, tool: T) -> Self {
        self.registry.register(tool);
        self
    }

    pub fn tool_with<T: ToolTrait + 'static>(mut self, descriptor: ToolDescriptor, tool: T) -> Self {
        self.registry.register_with(descriptor, tool);
        self
    }

    /// Disable every listed tool that is registered
    pub fn disable<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        for name in names {
            if !self.registry.set_enabled(name.as_ref(), false) {
                warn!("◆ CANNOT DISABLE UNKNOWN TOOL '{}'", name.as_ref());
            }
        }
        self
    }

    pub fn build(self) -> ToolRegistry {
        info!("◆ TOOL REGISTRY READY: {}", self.registry.names().join(", "));
        self.registry
    }
}

/// Standard tool set configured from `config`
pub fn default_registry(config: &Config, memory: Arc<dyn Memory>) -> ToolRegistry {
    let workspace = config.workspace_path();
    let sandbox = &config.sandbox;
    let max_output = sandbox.max_output_bytes;

    let shell = ExecTool::new(
        CommandPolicy::new(&sandbox.shell_commands),
        Duration::from_secs(sandbox.shell_timeout_secs),
        workspace.clone(),
        max_output,
    );
    let osint = OsintTool::new(
        CommandPolicy::new(&sandbox.osint_commands),
        Duration::from_secs(sandbox.osint_timeout_secs),
        max_output,
    );
    let write_file = WriteFileTool::new(workspace.clone());

    ToolRegistry::builder()
        .tool(SystemInfoTool)
        .tool(RememberTool::new(memory.clone()))
        .tool(RecallTool::new(memory, config.agent.memory_results.max(1)))
        .tool(osint)
        .tool_with(shell.descriptor().enabled(sandbox.allow_shell), shell)
        .tool(ReadFileTool::new(workspace.clone()).with_max_output(max_output))
        .tool_with(
            write_file.descriptor().enabled(sandbox.allow_shell),
            write_file,
        )
        .tool(ListFilesTool::new(workspace))
        .disable(config.tools.disabled.as_slice())
        .build()
}
