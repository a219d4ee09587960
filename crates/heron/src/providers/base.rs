use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::function::{FunctionCall, FunctionSpec, ResponseSchema};
use crate::models::role::ReplayEntry;

/// Token fragments of a streamed completion
pub type TextStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// The upstream text generation service.
///
/// Every call takes the model-replay view of a conversation, system entry first.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Single-shot completion whose output must be a JSON document following `schema`
    async fn complete_structured(
        &self,
        messages: &[ReplayEntry],
        schema: &ResponseSchema,
    ) -> Result<Value>;

    /// Ask the model to pick exactly one of `functions`.
    ///
    /// Returns `None` when the model made no selection.
    async fn choose_function(
        &self,
        messages: &[ReplayEntry],
        functions: &[FunctionSpec],
    ) -> Result<Option<FunctionCall>>;

    /// Free text completion, streamed token by token
    async fn stream_text(&self, messages: &[ReplayEntry]) -> Result<TextStream>;
}
