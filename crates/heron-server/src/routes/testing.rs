use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use heron::conversation::ConversationConfig;
use heron::models::function::{FunctionCall, FunctionSpec, ResponseSchema};
use heron::models::role::ReplayEntry;
use heron::orchestrator::{Orchestrator, OrchestratorConfig};
use heron::providers::base::{Provider, TextStream};
use heron::storage::JsonlStore;
use heron::tools::default_registry;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::state::AppState;

/// Treats every message as one request for the conversational tool
pub struct ScriptedProvider {
    pub tokens: Vec<&'static str>,
    /// When set, the token stream never ends and raises the flag once it is dropped
    pub stall: Option<Arc<AtomicBool>>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete_structured(
        &self,
        messages: &[ReplayEntry],
        schema: &ResponseSchema,
    ) -> Result<Value> {
        if schema.name == "conversation_title" {
            return Ok(json!({ "title": "Scripted Chat" }));
        }
        let last = messages
            .last()
            .map(|entry| entry.content.clone())
            .unwrap_or_default();
        let request = last.trim_start_matches("Split this message into requests: ");
        Ok(json!({ "requests": [request] }))
    }

    async fn choose_function(
        &self,
        _messages: &[ReplayEntry],
        functions: &[FunctionSpec],
    ) -> Result<Option<FunctionCall>> {
        Ok(functions
            .first()
            .map(|function| FunctionCall::new(function.name.clone(), json!({}))))
    }

    async fn stream_text(&self, _messages: &[ReplayEntry]) -> Result<TextStream> {
        let tokens: Vec<Result<String>> = self.tokens.iter().map(|t| Ok(t.to_string())).collect();
        match &self.stall {
            None => Ok(stream::iter(tokens).boxed()),
            Some(flag) => {
                let guard = DropFlag(flag.clone());
                Ok(stream::iter(tokens)
                    .chain(stream::pending())
                    .map(move |token| {
                        let _alive = &guard;
                        token
                    })
                    .boxed())
            }
        }
    }
}

pub fn test_state(dir: &Path, tokens: Vec<&'static str>) -> AppState {
    state_with_provider(dir, ScriptedProvider { tokens, stall: None })
}

pub fn state_with_provider(dir: &Path, provider: ScriptedProvider) -> AppState {
    let orchestrator = Orchestrator::new(
        Arc::new(provider),
        Arc::new(default_registry()),
        OrchestratorConfig::default(),
    );
    AppState::new(
        orchestrator,
        JsonlStore::new(dir),
        ConversationConfig::default(),
    )
}
