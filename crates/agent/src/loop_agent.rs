//! Agent loop - core processing engine
//!
//! One user turn cycles `AWAIT_MODEL → HAVE_RESPONSE → DISPATCH_TOOL` until
//! the model answers without a tool call, emits the `DONE` sentinel, the
//! step budget runs out, or the turn is cancelled.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kaien_config::Config;
use kaien_provider::{ChatParams, ChatResponse, Message, Provider, ToolCallDef, ToolChoice};

use crate::context::ContextBuilder;
use crate::interpreter::{interpret, strip_sentinel, Interpretation};
use crate::memory::Memory;
use crate::session::Session;
use crate::tools::{default_registry, ToolRegistry};
use crate::{AgentError, Result};

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    /// Model emitted the termination sentinel
    Done,
    /// Model answered without requesting a tool
    AwaitUser,
    /// `max_steps` dispatches made without a final answer
    BudgetExhausted,
    Cancelled,
}

/// Result of one user turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text for the user
    pub reply: String,
    /// Full message trail of the turn, system prompt first
    pub messages: Vec<Message>,
    /// Steps consumed
    pub steps: u32,
    pub end: TurnEnd,
}

/// Per-turn control state; dropped when the turn ends
#[derive(Debug, Clone)]
pub struct LoopState {
    pub messages: Vec<Message>,
    pub step_count: u32,
    pub max_steps: u32,
}

impl LoopState {
    pub fn new(messages: Vec<Message>, max_steps: u32) -> Self {
        Self {
            messages,
            step_count: 0,
            max_steps,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn has_budget(&self) -> bool {
        self.step_count < self.max_steps
    }
}

/// The agent loop drives the model and dispatches its tool calls
pub struct AgentLoop<P: Provider> {
    provider: Arc<P>,
    tools: Arc<ToolRegistry>,
    context: ContextBuilder,
    model: String,
    max_steps: u32,
    max_tokens: u32,
    temperature: f32,
    max_history_messages: usize,
}

impl<P: Provider> AgentLoop<P> {
    pub fn new(
        provider: P,
        tools: ToolRegistry,
        context: ContextBuilder,
        model: impl Into<String>,
        max_steps: u32,
    ) -> Self {
        let context = context.with_tools(&tools);
        let defaults = ChatParams::default();
        Self {
            provider: Arc::new(provider),
            tools: Arc::new(tools),
            context,
            model: model.into(),
            max_steps,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            max_history_messages: 20,
        }
    }

    /// Standard tool set, memory-aware context and limits from `config`
    pub fn from_config(provider: P, config: &Config, memory: Arc<dyn Memory>) -> Self {
        let workspace = config.workspace_path();
        let tools = default_registry(config, memory.clone());
        let context =
            ContextBuilder::new(&workspace).with_memory(memory, config.agent.memory_results);

        let mut agent = Self::new(
            provider,
            tools,
            context,
            config.default_model(),
            config.max_steps(),
        )
        .with_generation(config.agent.max_tokens, config.agent.temperature);
        agent.set_max_history_messages(config.agent.history_messages);
        agent
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Set the maximum number of history messages replayed per turn
    pub fn set_max_history_messages(&mut self, max: usize) {
        self.max_history_messages = max;
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Run a turn against `session`, recording the exchange in it
    pub async fn process(
        &self,
        session: &mut Session,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        info!("Processing message for session {}", session.key);
        let history = session.history(self.max_history_messages);
        match self.run_turn(history, input, cancel).await {
            Ok(outcome) => {
                session.add_exchange(input, outcome.reply.clone());
                Ok(outcome)
            }
            Err(e) => {
                error!("Agent loop error: {}", e);
                session.add_exchange(input, format!("Error: {}", e));
                Err(e)
            }
        }
    }

    /// Run one user turn.
    ///
    /// Recoverable failures become observations and cost one step each;
    /// only [`AgentError::ResourceExhausted`] is returned as `Err`.
    pub async fn run_turn(
        &self,
        history: Vec<Message>,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        debug!("Content: {}", truncate_chars(user_input, 100));
        let messages = self.context.build_messages(history, user_input).await;
        let mut state = LoopState::new(messages, self.max_steps);
        let tools = self.tools.definitions();
        let mut last_error: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(state));
            }

            // AWAIT_MODEL
            debug!("◆ STEP {}/{}: AWAITING MODEL", state.step_count + 1, state.max_steps);
            let params = ChatParams {
                model: self.model.clone(),
                messages: state.messages.clone(),
                tools: tools.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                tool_choice: ToolChoice::Auto,
            };
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.cancelled(state)),
                response = self.provider.chat(params) => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let err = AgentError::ModelUnavailable(e.to_string());
                    warn!("{}", err);
                    state.push(Message::observation(err.to_string()));
                    last_error = Some(err.to_string());
                    state.step_count += 1;
                    if !state.has_budget() {
                        return Ok(self.exhausted(state, last_error));
                    }
                    continue;
                }
            };

            // HAVE_RESPONSE
            let interpretation = interpret(&response);
            state.push(assistant_message(&response, &interpretation));
            if response.tool_calls.len() > 1 {
                debug!(
                    "◆ {} TOOL CALLS RETURNED, DISPATCHING THE FIRST",
                    response.tool_calls.len()
                );
            }

            match interpretation {
                Interpretation::Done => {
                    let reply = or_default(strip_sentinel(response.text_content()), "Task completed.");
                    info!("◆ TURN DONE AFTER {} STEPS", state.step_count);
                    return Ok(finish(state, TurnEnd::Done, reply));
                }
                Interpretation::NoTool => {
                    let reply = or_default(response.text_content().trim().to_string(), "[No Response]");
                    return Ok(finish(state, TurnEnd::AwaitUser, reply));
                }
                Interpretation::Invalid {
                    call_id,
                    name,
                    reason,
                } => {
                    if !state.has_budget() {
                        return Ok(self.exhausted(state, last_error));
                    }
                    let err = AgentError::InvalidArguments(reason);
                    warn!("{}", err);
                    state.push(observation(
                        call_id.as_deref(),
                        name.as_deref().unwrap_or("unknown"),
                        err.to_string(),
                    ));
                    last_error = Some(err.to_string());
                }
                Interpretation::Invoke(invocation) => {
                    if !state.has_budget() {
                        return Ok(self.exhausted(state, last_error));
                    }
                    // DISPATCH_TOOL
                    info!(
                        "◆ DISPATCHING {} (STEP {}/{})",
                        invocation.name,
                        state.step_count + 1,
                        state.max_steps
                    );
                    let content = match self.tools.invoke(&invocation, cancel).await {
                        Ok(output) => {
                            last_error = None;
                            output
                        }
                        Err(e) if e.is_fatal() => {
                            error!("{}", e);
                            return Err(e);
                        }
                        Err(e) => {
                            warn!("◆ TOOL {} FAILED: {}", invocation.name, e);
                            last_error = Some(e.to_string());
                            e.to_string()
                        }
                    };
                    state.push(observation(
                        invocation.call_id.as_deref(),
                        &invocation.name,
                        content,
                    ));
                }
            }

            state.step_count += 1;
            if cancel.is_cancelled() {
                return Ok(self.cancelled(state));
            }
            if !state.has_budget() {
                return Ok(self.exhausted(state, last_error));
            }
        }
    }

    fn cancelled(&self, state: LoopState) -> TurnOutcome {
        info!("◆ TURN CANCELLED AFTER {} STEPS", state.step_count);
        finish(state, TurnEnd::Cancelled, "◆ TURN CANCELLED".to_string())
    }

    fn exhausted(&self, mut state: LoopState, last_error: Option<String>) -> TurnOutcome {
        let mut reply = format!(
            "◆ STEP BUDGET EXHAUSTED: {} of {} steps used without a final answer.",
            state.step_count, state.max_steps
        );
        if let Some(err) = last_error {
            reply.push_str(&format!("\nLast error: {}", err));
        }
        warn!("{}", reply);
        state.push(Message::observation(reply.clone()));
        finish(state, TurnEnd::BudgetExhausted, reply)
    }
}

fn finish(state: LoopState, end: TurnEnd, reply: String) -> TurnOutcome {
    TurnOutcome {
        reply,
        steps: state.step_count,
        messages: state.messages,
        end,
    }
}

/// Assistant entry for the trail; records the structured call being answered
fn assistant_message(response: &ChatResponse, interpretation: &Interpretation) -> Message {
    let message = Message::assistant(response.text_content());
    let answered = match interpretation {
        Interpretation::Invoke(invocation) => invocation.call_id.is_some(),
        Interpretation::Invalid { call_id, .. } => call_id.is_some(),
        _ => false,
    };
    match response.tool_calls.first() {
        Some(call) if answered => message.with_tool_calls(vec![ToolCallDef::from(call)]),
        _ => message,
    }
}

fn observation(call_id: Option<&str>, name: &str, content: String) -> Message {
    match call_id {
        Some(id) => Message::tool_observation(id, name, content),
        None => Message::observation(format!("[{}] {}", name, content)),
    }
}

fn or_default(text: String, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
