//! Conversation Orchestrator
//!
//! Runs one conversation turn as a bounded loop of provider calls:
//!
//! 1. Pick a model tier for the iteration
//! 2. Trim the outgoing history with the context window manager
//! 3. Call the provider (with a timeout)
//! 4. Emit text and tool-call events, keep reasoning in the log only
//! 5. On `tool_use`, run every call in order and append one user message
//!    holding all results, then loop
//! 6. Anything else ends the turn
//!
//! Provider failures end the turn with an apology. Hitting the iteration
//! limit ends it with a fixed notice. Every turn ends with a `done` event.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::context;
use crate::llm::router::ModelRouter;
use crate::llm::{
    CompletionRequest, ContentBlock, ConversationMessage, LLMError, LLMProvider, Role, StopReason,
    ToolDefinition, Usage,
};
use crate::message_bus::{Event, MessageBus};
use crate::tools::{ToolContext, ToolExecutor};
use sdk::types::AgentEvent;

/// Default maximum number of provider calls per turn
pub const MAX_ITERATIONS: usize = 15;

/// Default timeout for each provider call in seconds
const PROVIDER_TIMEOUT_SECS: u64 = 300;

/// Result field that carries structures for the viewer
const VISUALIZATION_FIELD: &str = "pdb_contents";

pub const ITERATION_LIMIT_MESSAGE: &str = "I've reached the maximum number of tool-use steps \
     for this turn. Please send another message to continue.";

/// Message log of one conversation, threaded through every turn
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub messages: Vec<ConversationMessage>,
}

impl ConversationContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
        }
    }

    /// Start a conversation with a fresh id
    pub fn fresh() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

/// Outcome of one turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    pub model_used: String,
    pub iterations: usize,
    /// All assistant text of the turn joined by blank lines
    pub final_text: String,
    pub usage: Option<Usage>,
    pub hit_iteration_limit: bool,
}

pub struct Orchestrator {
    provider: Arc<dyn LLMProvider>,
    router: ModelRouter,
    tools: Arc<dyn ToolExecutor>,
    tool_definitions: Vec<ToolDefinition>,
    system_prompt: String,
    max_iterations: usize,
    provider_timeout: Duration,
    bus: Option<Arc<MessageBus>>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        router: ModelRouter,
        tools: Arc<dyn ToolExecutor>,
    ) -> Self {
        let tool_definitions = tools.definitions();
        Self {
            provider,
            router,
            tools,
            tool_definitions,
            system_prompt: super::prompt::SYSTEM_PROMPT.to_string(),
            max_iterations: MAX_ITERATIONS,
            provider_timeout: Duration::from_secs(PROVIDER_TIMEOUT_SECS),
            bus: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_provider_timeout(mut self, provider_timeout: Duration) -> Self {
        self.provider_timeout = provider_timeout;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Publish `MessageAppended` events on the bus
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Run one turn for `user_text`, streaming events into `events`
    ///
    /// The conversation log in `ctx` is extended in place. Events are sent in
    /// emission order; a dropped receiver does not stop the turn.
    pub async fn run_turn(
        &self,
        ctx: &mut ConversationContext,
        user_text: &str,
        events: &mpsc::Sender<AgentEvent>,
    ) -> TurnSummary {
        ctx.messages.push(ConversationMessage::user(user_text));
        self.publish_message(ctx, Role::User, user_text, None, None)
            .await;

        let tool_ctx = ToolContext::new(ctx.conversation_id.clone());
        let mut texts: Vec<String> = Vec::new();
        let mut model_used = String::new();
        let mut last_usage: Option<Usage> = None;
        let mut iterations = 0;
        let mut finished = false;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;

            let prior_tool_use = iteration > 0
                && ctx
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant)
                    .is_some_and(|m| m.has_tool_calls());
            let tier = self.router.select(user_text, iteration, prior_tool_use);
            let model = self.router.model_id(tier).to_string();
            model_used = model.clone();

            info!(
                "[{}] iteration {}/{} tier={} model={}",
                ctx.conversation_id, iterations, self.max_iterations, tier, model
            );

            let outgoing = context::prepare(&ctx.messages);
            let request = CompletionRequest {
                model: &model,
                system_prompt: &self.system_prompt,
                tools: &self.tool_definitions,
                messages: &outgoing,
                max_output_tokens: self.router.max_output_tokens(tier),
                reasoning: self.router.reasoning_config(tier),
            };

            let result = match timeout(self.provider_timeout, self.provider.complete(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(LLMError::Timeout),
            };

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    error!("[{}] provider call failed: {}", ctx.conversation_id, e);
                    let apology = format!("I encountered an API error: {}. Please try again.", e);
                    emit(events, AgentEvent::Text(apology.clone())).await;
                    ctx.messages.push(ConversationMessage::assistant(apology.clone()));
                    texts.push(apology);
                    last_usage = None;
                    finished = true;
                    break;
                }
            };
            last_usage = Some(response.usage);

            let mut calls: Vec<(String, String, serde_json::Value)> = Vec::new();
            for block in &response.content {
                match block {
                    ContentBlock::Text { text } => {
                        texts.push(text.clone());
                        emit(events, AgentEvent::Text(text.clone())).await;
                    }
                    ContentBlock::ToolCall { id, name, input } => {
                        calls.push((id.clone(), name.clone(), input.clone()));
                        emit(
                            events,
                            AgentEvent::ToolCall {
                                name: name.clone(),
                                input: input.clone(),
                            },
                        )
                        .await;
                    }
                    ContentBlock::InternalReasoning { .. } => {}
                    ContentBlock::ToolResult { .. } => {
                        warn!("[{}] provider returned a tool_result block", ctx.conversation_id);
                    }
                }
            }

            if !response.content.is_empty() {
                ctx.messages
                    .push(ConversationMessage::blocks(Role::Assistant, response.content));
            }

            match response.stop_reason {
                StopReason::EndTurn => {
                    finished = true;
                    break;
                }
                StopReason::ToolUse if !calls.is_empty() => {
                    let results = self.execute_calls(&calls, &tool_ctx, events).await;
                    ctx.messages
                        .push(ConversationMessage::blocks(Role::User, results));
                }
                other => {
                    warn!(
                        "[{}] ending turn on stop reason {:?} with {} tool call(s)",
                        ctx.conversation_id,
                        other,
                        calls.len()
                    );
                    finished = true;
                    break;
                }
            }
        }

        let hit_iteration_limit = !finished;
        if hit_iteration_limit {
            info!(
                "[{}] iteration limit of {} reached",
                ctx.conversation_id, self.max_iterations
            );
            emit(events, AgentEvent::Text(ITERATION_LIMIT_MESSAGE.to_string())).await;
            ctx.messages
                .push(ConversationMessage::assistant(ITERATION_LIMIT_MESSAGE));
            texts.push(ITERATION_LIMIT_MESSAGE.to_string());
        }

        let final_text = texts.join("\n\n");
        if !final_text.trim().is_empty() {
            self.publish_message(
                ctx,
                Role::Assistant,
                &final_text,
                Some(model_used.clone()),
                last_usage.map(|u| u.total()),
            )
            .await;
        }

        emit(
            events,
            AgentEvent::Done {
                model_used: model_used.clone(),
                iterations,
            },
        )
        .await;

        TurnSummary {
            model_used,
            iterations,
            final_text,
            usage: last_usage,
            hit_iteration_limit,
        }
    }

    /// Run tool calls in order and build the result blocks
    async fn execute_calls(
        &self,
        calls: &[(String, String, serde_json::Value)],
        tool_ctx: &ToolContext,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Vec<ContentBlock> {
        let mut results = Vec::with_capacity(calls.len());

        for (id, name, input) in calls {
            let raw = self.tools.dispatch(name, input, tool_ctx).await;
            let compressed = context::compress_tool_result(&raw);
            debug!(
                "Tool '{}' returned {} chars ({} after compression)",
                name,
                raw.chars().count(),
                compressed.chars().count()
            );

            emit(
                events,
                AgentEvent::ToolResult {
                    name: name.clone(),
                    result: compressed.clone(),
                },
            )
            .await;

            if let Some(visualization) = visualization_event(&raw) {
                emit(events, visualization).await;
            }

            results.push(ContentBlock::tool_result(id.clone(), compressed));
        }

        results
    }

    async fn publish_message(
        &self,
        ctx: &ConversationContext,
        role: Role,
        content: &str,
        model_used: Option<String>,
        token_count: Option<u64>,
    ) {
        if let Some(bus) = &self.bus {
            bus.publish(Event::MessageAppended {
                conversation_id: ctx.conversation_id.clone(),
                role: role.to_string(),
                content: content.to_string(),
                model_used,
                token_count,
            })
            .await;
        }
    }
}

async fn emit(events: &mpsc::Sender<AgentEvent>, event: AgentEvent) {
    if events.send(event).await.is_err() {
        debug!("Event receiver dropped");
    }
}

/// Visualization event for a raw tool result carrying structures
fn visualization_event(raw: &str) -> Option<AgentEvent> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let pdb_contents = object.get(VISUALIZATION_FIELD)?.clone();

    let field = |key: &str, default: &str| {
        object
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    };

    Some(AgentEvent::Visualization {
        pdb_contents,
        style: field("style", "cartoon"),
        color_by: field("color_by", "chain"),
    })
}
