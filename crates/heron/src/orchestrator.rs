//! One conversational turn, from user text to an ordered stream of messages.
//!
//! The user's message is split into sub-requests, and each is planned, dispatched to a tool
//! and recorded before the next is planned, so later requests see earlier results in the
//! conversation.
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use strum_macros::Display;

use crate::conversation::Conversation;
use crate::decompose::decompose;
use crate::errors::{FieldError, GenerationError, GenerationResult};
use crate::models::function::ResponseSchema;
use crate::models::message::Message;
use crate::plan::{create_plan, Plan};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::structured::{generate, StructuredOutput, Validate, DEFAULT_MAX_ATTEMPTS};
use crate::tools::{ToolRegistry, ToolState};

/// Attributed to messages produced without a tool
pub const BAKED_RESPONSE: &str = "baked_response";

pub const MAX_TITLE_CHARS: usize = 36;

const HELP_TEXT: &str = "This is a prototype chatbot that answers questions by planning each \
request and handing it to the tool best suited to it. Ask it to find, count or summarize \
records, or just say hello.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TurnState {
    Idle,
    Decomposing,
    Planning,
    Dispatching,
    Streaming,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Attempts allowed for each structured generation call
    pub max_attempts: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    config: OrchestratorConfig,
    baked: Vec<(String, String)>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
            baked: vec![
                ("help".to_string(), HELP_TEXT.to_string()),
                ("ping".to_string(), "pong".to_string()),
            ],
        }
    }

    /// Answer `trigger` with a fixed reply, skipping planning entirely
    pub fn with_baked_response(mut self, trigger: &str, text: &str) -> Self {
        let trigger = trigger.trim().to_lowercase();
        self.baked.retain(|(existing, _)| *existing != trigger);
        self.baked.push((trigger, text.to_string()));
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn baked_response(&self, user_message: &str) -> Option<&str> {
        let normalized = user_message.trim().to_lowercase();
        self.baked
            .iter()
            .find(|(trigger, _)| *trigger == normalized)
            .map(|(_, text)| text.as_str())
    }

    /// Handle one user message.
    ///
    /// Every message is yielded before it is appended to `conversation`, so a consumer that
    /// streams it to the client drives the upstream generation, and the append then freezes
    /// the already drained content.
    pub fn reply<'a>(
        &'a self,
        conversation: &'a Conversation,
        user_message: &'a str,
    ) -> BoxStream<'a, Message> {
        Box::pin(async_stream::stream! {
            let mut state = TurnState::Idle;
            conversation.append(&Message::user_text(user_message)).await;

            if let Some(text) = self.baked_response(user_message) {
                let message = Message::ai_text(text).with_tool_name(BAKED_RESPONSE);
                yield message.clone();
                conversation.append(&message).await;
                return;
            }

            transition(&mut state, TurnState::Decomposing, conversation);
            let requests = match decompose(
                self.provider.as_ref(),
                conversation,
                user_message,
                self.config.max_attempts,
            )
            .await
            {
                Ok(requests) => requests,
                Err(e) => {
                    tracing::warn!(error = %e, "Decomposition failed, handling the message as one request");
                    vec![user_message.to_string()]
                }
            };

            let work: Vec<(String, Option<Plan>)> = if requests.is_empty() {
                vec![(user_message.to_string(), Some(Plan::fallback()))]
            } else {
                requests.into_iter().map(|request| (request, None)).collect()
            };

            let mut tool_state = ToolState::new();
            for (request, fixed_plan) in work {
                transition(&mut state, TurnState::Planning, conversation);
                let plan = match fixed_plan {
                    Some(plan) => plan,
                    None => match create_plan(
                        self.provider.as_ref(),
                        &self.registry,
                        conversation,
                        &request,
                    )
                    .await
                    {
                        Ok(plan) => plan,
                        Err(e) => {
                            tracing::error!(error = %e, request = %request, "Planning failed");
                            Plan::none()
                        }
                    },
                };

                transition(&mut state, TurnState::Dispatching, conversation);
                let tool = match plan.tool_name.as_deref().and_then(|name| self.registry.get(name)) {
                    Some(tool) => tool,
                    None => {
                        let message = plan.unresolved_message();
                        yield message.clone();
                        conversation.append(&message).await;
                        continue;
                    }
                };

                transition(&mut state, TurnState::Streaming, conversation);
                let mut messages = tool.call(
                    self.provider.clone(),
                    conversation,
                    &request,
                    &mut tool_state,
                );
                while let Some(message) = messages.next().await {
                    let message = message.with_tool_name(tool.name());
                    yield message.clone();
                    conversation.append(&message).await;
                }
            }
            transition(&mut state, TurnState::Idle, conversation);
        })
    }

    /// Generate a short title for the conversation
    pub async fn generate_title(&self, conversation: &Conversation) -> GenerationResult<String> {
        let system = load_prompt_file("title.md", &json!({"max_chars": MAX_TITLE_CHARS}))
            .map_err(|e| GenerationError::Provider(e.into()))?;
        let messages = conversation.render_model_replay(&system, None);
        let title: Title =
            generate(self.provider.as_ref(), messages, self.config.max_attempts).await?;
        Ok(title.title.trim().to_string())
    }
}

fn transition(state: &mut TurnState, next: TurnState, conversation: &Conversation) {
    tracing::debug!(
        conversation_id = %conversation.id(),
        from = %state,
        to = %next,
        "Turn state changed"
    );
    *state = next;
}

#[derive(Debug, Deserialize)]
struct Title {
    title: String,
}

impl Validate for Title {
    fn validate(&self) -> Vec<FieldError> {
        let title = self.title.trim();
        if title.is_empty() {
            vec![FieldError::retry("title", "must not be empty")]
        } else if title.chars().count() > MAX_TITLE_CHARS {
            vec![FieldError::retry(
                "title",
                format!("must be at most {} characters", MAX_TITLE_CHARS),
            )]
        } else {
            Vec::new()
        }
    }
}

impl StructuredOutput for Title {
    fn schema() -> ResponseSchema {
        ResponseSchema::new(
            "conversation_title",
            json!({
                "type": "object",
                "properties": {"title": {"type": "string"}},
                "required": ["title"],
                "additionalProperties": false
            }),
        )
    }
}
