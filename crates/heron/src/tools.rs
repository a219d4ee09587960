pub mod converse;

use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::conversation::Conversation;
use crate::models::function::FunctionSpec;
use crate::models::message::Message;
use crate::providers::base::{Provider, TextStream};

pub use converse::Converse;

/// Scratch space shared by every tool call of one turn
pub type ToolState = Map<String, Value>;

/// A named capability the planner can dispatch a request to.
///
/// Tools return their messages lazily. The orchestrator records each message after the
/// client has received it, so a tool must not assume its output has been fully consumed
/// before the next message is requested.
pub trait Tool: Send + Sync {
    /// Stable name, used by the planner to select the tool
    fn name(&self) -> &str;

    /// Shown to the planner verbatim
    fn description(&self) -> &str;

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn spec(&self) -> FunctionSpec {
        FunctionSpec::new(self.name(), self.description(), self.parameters())
    }

    fn call<'a>(
        &'a self,
        provider: Arc<dyn Provider>,
        conversation: &'a Conversation,
        request: &'a str,
        state: &'a mut ToolState,
    ) -> BoxStream<'a, Message>;
}

/// Name-keyed lookup of the tools available to the planner, read-only once built
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool already registered under the same name
    pub fn with_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!(tool = %name, "Replacing a tool registered twice");
        } else {
            self.order.push(name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in registration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// The planning catalog, in registration order
    pub fn catalog(&self) -> Vec<FunctionSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Every tool this crate ships
pub fn default_registry() -> ToolRegistry {
    ToolRegistry::new().with_tool(Converse)
}

/// Turn a token stream into plain text, ending with a readable note if the upstream fails
pub fn text_with_errors(tokens: TextStream) -> impl Stream<Item = String> + Send + 'static {
    tokens
        .scan(false, |failed, token| {
            let item = if *failed {
                None
            } else {
                match token {
                    Ok(text) => Some(text),
                    Err(e) => {
                        tracing::error!(error = %e, "Token stream failed");
                        *failed = true;
                        Some(format!("\n\nError: {}", e))
                    }
                }
            };
            futures::future::ready(item)
        })
}
