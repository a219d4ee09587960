use futures::stream::BoxStream;
use serde_json::json;
use std::sync::Arc;

use super::{text_with_errors, Tool, ToolState};
use crate::content::StreamedContent;
use crate::conversation::Conversation;
use crate::models::message::Message;
use crate::prompt_template::{load_prompt_file, with_date_header};
use crate::providers::base::Provider;

pub const CONVERSE: &str = "converse";

const APOLOGY: &str =
    "Sorry, I'm having trouble responding right now. Please try again in a moment.";

/// The fallback tool, a friendly reply streamed straight from the model
pub struct Converse;

impl Tool for Converse {
    fn name(&self) -> &str {
        CONVERSE
    }

    fn description(&self) -> &str {
        "If the user is not requesting information or is requesting information that you cannot \
         provide, address their request in a friendly manner."
    }

    fn call<'a>(
        &'a self,
        provider: Arc<dyn Provider>,
        conversation: &'a Conversation,
        request: &'a str,
        _state: &'a mut ToolState,
    ) -> BoxStream<'a, Message> {
        Box::pin(async_stream::stream! {
            let system = match load_prompt_file("converse.md", &json!({})) {
                Ok(prompt) => with_date_header(&prompt),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load the conversation prompt");
                    yield Message::ai_text(APOLOGY);
                    return;
                }
            };
            let messages = conversation.render_model_replay(&system, Some(request));

            match provider.stream_text(&messages).await {
                Ok(tokens) => {
                    yield Message::ai_text(StreamedContent::text(text_with_errors(tokens)));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start a conversational reply");
                    yield Message::ai_text(APOLOGY);
                }
            }
        })
    }
}
