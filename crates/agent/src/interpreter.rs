//! Response interpretation
//!
//! Turns a model response into the next loop action. Precedence:
//! 1. a structured tool call,
//! 2. the `DONE` sentinel outside any embedded JSON,
//! 3. a tool call embedded in free text (fenced ```json block, then the
//!    first parseable top-level `{...}` span),
//! 4. otherwise no tool call.

use kaien_provider::{ChatResponse, ToolCall};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static SENTINEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bDONE\b").expect("sentinel pattern"));

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```[ \t]*json[ \t]*\r?\n?(.*?)```").expect("fence pattern"));

/// A decoded request to run one tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub args: Map<String, Value>,
    /// Provider call id for structured calls
    pub call_id: Option<String>,
}

/// What the loop should do with a response
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Invoke(ToolInvocation),
    Done,
    NoTool,
    /// A tool call was attempted but could not be decoded
    Invalid {
        call_id: Option<String>,
        name: Option<String>,
        reason: String,
    },
}

pub fn interpret(response: &ChatResponse) -> Interpretation {
    if let Some(call) = response.tool_calls.first() {
        return interpret_structured(call);
    }

    let text = response.text_content();
    let embedded = find_embedded_json(text);
    let outside = match &embedded {
        Some((start, end, _)) => format!("{}{}", &text[..*start], &text[*end..]),
        None => text.to_string(),
    };
    if SENTINEL.is_match(&outside) {
        return Interpretation::Done;
    }

    match embedded {
        Some((_, _, value)) => interpret_value(&value, 0),
        None => Interpretation::NoTool,
    }
}

/// The tool invocation in `response`, if one decodes cleanly
pub fn extract(response: &ChatResponse) -> Option<ToolInvocation> {
    match interpret(response) {
        Interpretation::Invoke(invocation) => Some(invocation),
        _ => None,
    }
}

/// `text` with the `DONE` sentinel removed
pub fn strip_sentinel(text: &str) -> String {
    SENTINEL.replace_all(text, "").trim().to_string()
}

fn interpret_structured(call: &ToolCall) -> Interpretation {
    let call_id = Some(call.id.clone()).filter(|id| !id.is_empty());
    let name = call.name.trim();
    if name.is_empty() {
        return Interpretation::Invalid {
            call_id,
            name: None,
            reason: "tool call without a function name".to_string(),
        };
    }
    match decode_arguments(name, &call.arguments) {
        Ok(args) => Interpretation::Invoke(ToolInvocation {
            name: name.to_string(),
            args,
            call_id,
        }),
        Err(reason) => Interpretation::Invalid {
            call_id,
            name: Some(name.to_string()),
            reason,
        },
    }
}

/// Decode a JSON-encoded argument string. Blank or `null` means no arguments.
fn decode_arguments(name: &str, raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => arguments_from_value(name, value),
        Err(e) => Err(format!("cannot parse arguments for '{}': {}", name, e)),
    }
}

fn arguments_from_value(name: &str, value: Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::String(s) => decode_arguments(name, &s),
        other => Err(format!(
            "arguments for '{}' must be a JSON object, got {}",
            name, other
        )),
    }
}

const ARGUMENT_KEYS: [&str; 4] = ["args", "arguments", "parameters", "input"];
const WRAPPER_KEYS: [&str; 3] = ["tool_call", "function_call", "function"];

fn interpret_value(value: &Value, depth: usize) -> Interpretation {
    let Some(obj) = value.as_object() else {
        return Interpretation::NoTool;
    };

    if depth < 2 {
        for key in WRAPPER_KEYS {
            if let Some(inner) = obj.get(key).filter(|v| v.is_object()) {
                return interpret_value(inner, depth + 1);
            }
        }
    }

    let name = ["tool", "name"]
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|n| !n.is_empty());
    let Some(name) = name else {
        return Interpretation::NoTool;
    };

    let raw_args = ARGUMENT_KEYS
        .iter()
        .find_map(|k| obj.get(*k))
        .cloned()
        .unwrap_or(Value::Null);
    match arguments_from_value(name, raw_args) {
        Ok(args) => Interpretation::Invoke(ToolInvocation {
            name: name.to_string(),
            args,
            call_id: None,
        }),
        Err(reason) => Interpretation::Invalid {
            call_id: None,
            name: Some(name.to_string()),
            reason,
        },
    }
}

/// Locate the JSON payload in free text: byte span plus parsed value
fn find_embedded_json(text: &str) -> Option<(usize, usize, Value)> {
    for caps in FENCED_JSON.captures_iter(text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim()) {
            return Some((whole.start(), whole.end(), value));
        }
    }

    top_level_spans(text).into_iter().find_map(|(start, end)| {
        serde_json::from_str::<Value>(&text[start..end])
            .ok()
            .filter(Value::is_object)
            .map(|value| (start, end, value))
    })
}

/// Byte spans of balanced top-level `{...}` groups, string and escape aware
fn top_level_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if depth > 0 && in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push((start, i + 1));
                }
            }
            _ => {}
        }
    }
    spans
}
