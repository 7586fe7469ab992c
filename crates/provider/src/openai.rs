//! OpenAI-compatible chat completions client
//!
//! Works against Ollama's `/v1` endpoint, OpenRouter and OpenAI.

use crate::*;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "http://localhost:11434/v1";
const DEFAULT_MODEL: &str = "llama3.1:8b";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    api_base: String,
    default_model: String,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
    ) -> Self {
        Self::with_timeout(
            api_key,
            api_base,
            default_model,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
        timeout: Duration,
    ) -> Self {
        let api_base = api_base
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.into(),
            api_base,
            default_model: default_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout_secs: timeout.as_secs(),
        }
    }

    fn encode_message(m: &Message) -> Value {
        match m.role {
            Role::Observation => match &m.tool_call_id {
                Some(id) => {
                    let mut obj = json!({
                        "role": "tool",
                        "tool_call_id": id,
                        "content": &m.content,
                    });
                    if let Some(name) = &m.name {
                        obj["name"] = json!(name);
                    }
                    obj
                }
                // Free-text observations have no call to answer
                None => json!({
                    "role": "user",
                    "content": format!("Observation:\n{}", m.content),
                }),
            },
            Role::Assistant => {
                let mut obj = json!({ "role": "assistant" });
                match &m.tool_calls {
                    Some(calls) => {
                        obj["tool_calls"] = json!(calls);
                        obj["content"] = if m.content.is_empty() {
                            Value::Null
                        } else {
                            json!(&m.content)
                        };
                    }
                    None => obj["content"] = json!(&m.content),
                }
                obj
            }
            role => json!({ "role": role.as_str(), "content": &m.content }),
        }
    }

    fn build_request(&self, params: &ChatParams) -> Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        let messages: Vec<Value> = params.messages.iter().map(Self::encode_message).collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });

        if !params.tools.is_empty() {
            let tools: Vec<Value> = params
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": &t.function.name,
                            "description": &t.function.description,
                            "parameters": &t.function.parameters
                        }
                    })
                })
                .collect();

            body["tools"] = json!(tools);
            body["tool_choice"] = match &params.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::Required(name) => {
                    json!({"type": "function", "function": {"name": name}})
                }
                ToolChoice::None => json!("none"),
            };
        }

        body
    }

    fn parse_response(&self, json: Value) -> Result<ChatResponse> {
        let choice = json["choices"]
            .get(0)
            .ok_or(ProviderError::InvalidResponse)?;
        let message = &choice["message"];
        let content = message["content"].as_str().map(|s| s.to_string());
        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let function = &call["function"];
                // Some servers (older Ollama builds) send an object instead of a string
                let arguments = match &function["arguments"] {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };

                tool_calls.push(ToolCall {
                    id: call["id"].as_str().unwrap_or("").to_string(),
                    name: function["name"].as_str().unwrap_or("").to_string(),
                    arguments,
                });
            }
        }

        let usage = if let Some(usage) = json["usage"].as_object() {
            let count = |key: &str| usage.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            Usage {
                prompt_tokens: count("prompt_tokens"),
                completion_tokens: count("completion_tokens"),
                total_tokens: count("total_tokens"),
            }
        } else {
            Usage::default()
        };

        Ok(ChatResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured);
        }
        trace!("◆ MODEL REQUEST TO {}", self.api_base);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&params);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout_secs)
            } else {
                ProviderError::Request(e)
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        let json: Value = response.json().await?;

        if !status.is_success() {
            let error = json["error"]["message"]
                .as_str()
                .or_else(|| json["error"].as_str())
                .unwrap_or("UNKNOWN ERROR")
                .to_string();
            return Err(ProviderError::Api(error));
        }

        let parsed = self.parse_response(json)?;
        log_response(&parsed);
        Ok(parsed)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_base.is_empty()
    }
}
