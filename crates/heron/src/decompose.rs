use serde::Deserialize;
use serde_json::json;

use crate::conversation::Conversation;
use crate::errors::{FieldError, GenerationError, GenerationResult};
use crate::models::function::ResponseSchema;
use crate::models::role::ReplayEntry;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::structured::{generate, StructuredOutput, Validate};

/// The atomic requests found in one user message, in the order they should be handled
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Decomposition {
    pub requests: Vec<String>,
}

impl Validate for Decomposition {
    fn validate(&self) -> Vec<FieldError> {
        self.requests
            .iter()
            .enumerate()
            .filter(|(_, request)| request.trim().is_empty())
            .map(|(i, _)| FieldError::retry(format!("requests[{}]", i), "must not be empty"))
            .collect()
    }
}

impl StructuredOutput for Decomposition {
    fn schema() -> ResponseSchema {
        ResponseSchema::new(
            "decomposition",
            json!({
                "type": "object",
                "properties": {
                    "requests": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Self-contained requests, each answerable on its own"
                    }
                },
                "required": ["requests"],
                "additionalProperties": false
            }),
        )
    }
}

/// Split `user_message` into self-contained requests.
///
/// An empty result means the user asked for nothing actionable.
pub async fn decompose(
    provider: &dyn Provider,
    conversation: &Conversation,
    user_message: &str,
    max_attempts: u32,
) -> GenerationResult<Vec<String>> {
    let system = load_prompt_file("decompose.md", &json!({}))
        .map_err(|e| GenerationError::Provider(e.into()))?;
    let mut messages = conversation.render_model_replay(&system, None);
    messages.push(ReplayEntry::user(format!(
        "Split this message into requests: {}",
        user_message
    )));

    let decomposition: Decomposition = generate(provider, messages, max_attempts).await?;
    let requests: Vec<String> = decomposition
        .requests
        .into_iter()
        .map(|request| request.trim().to_string())
        .collect();
    tracing::debug!(count = requests.len(), "Decomposed user message");
    Ok(requests)
}
