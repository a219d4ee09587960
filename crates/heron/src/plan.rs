use anyhow::Result;
use serde_json::json;

use crate::conversation::Conversation;
use crate::models::message::Message;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::tools::converse::CONVERSE;
use crate::tools::ToolRegistry;

/// The tool selected for one sub-request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub tool_name: Option<String>,
}

impl Plan {
    pub fn tool<S: Into<String>>(name: S) -> Self {
        Self {
            tool_name: Some(name.into()),
        }
    }

    /// The model picked nothing
    pub fn none() -> Self {
        Self { tool_name: None }
    }

    pub fn fallback() -> Self {
        Self::tool(CONVERSE)
    }

    /// The single error reported when the plan names no registered tool
    pub fn unresolved_message(&self) -> Message {
        match &self.tool_name {
            Some(name) => Message::error(format!("Tried to use undefined tool \"{}\"", name)),
            None => Message::error("Could not find a tool to handle this request"),
        }
    }
}

/// Ask the model to pick exactly one registered tool for `request`
pub async fn create_plan(
    provider: &dyn Provider,
    registry: &ToolRegistry,
    conversation: &Conversation,
    request: &str,
) -> Result<Plan> {
    let catalog = registry.catalog();
    let system = load_prompt_file("plan.md", &json!({"tools": catalog, "fallback": CONVERSE}))?;
    let messages = conversation.render_model_replay(&system, Some(request));

    let plan = match provider.choose_function(&messages, &catalog).await? {
        Some(call) => Plan::tool(call.name),
        None => Plan::none(),
    };
    tracing::debug!(request, tool = ?plan.tool_name, "Planned sub-request");
    Ok(plan)
}
