use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::cold::ColdMessage;
use super::content::Content;
use super::role::{ReplayEntry, Role};

/// What the model is told about a map it cannot see.
const MAP_REPLAY_TEXT: &str = "This is a map of species occurrences around the globe.";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
/// The type tag sent to the client with every message
pub enum MessageType {
    UserTextMessage,
    AiTextMessage,
    AiMapMessage,
    AiProcessingMessage,
    Error,
}

#[derive(Debug, Clone)]
/// The closed set of message variants
pub enum MessageBody {
    UserText(String),
    AiText(Content),
    AiMap(Content),
    AiProcessing {
        /// Short human readable description of the work being done
        summary: Content,
        /// What the user sees while the work progresses
        content: Content,
        /// Internal notes, only used in the model-replay view
        thoughts: Content,
    },
    Error(String),
}

#[derive(Debug, Clone)]
/// A message produced during a turn, whose content may still be streaming
pub struct Message {
    pub body: MessageBody,
    /// The tool that produced the message, empty for user input
    pub tool_name: String,
    /// Hidden messages are recorded and replayed to the model but never sent to the client
    pub show_user: bool,
}

impl Message {
    fn new(body: MessageBody) -> Self {
        Message {
            body,
            tool_name: String::new(),
            show_user: true,
        }
    }

    pub fn user_text<S: Into<String>>(text: S) -> Self {
        Self::new(MessageBody::UserText(text.into()))
    }

    pub fn ai_text<C: Into<Content>>(text: C) -> Self {
        Self::new(MessageBody::AiText(text.into()))
    }

    pub fn ai_map<C: Into<Content>>(params: C) -> Self {
        Self::new(MessageBody::AiMap(params.into()))
    }

    /// A processing message whose thoughts default to its visible content
    pub fn ai_processing<S: Into<Content>, C: Into<Content>>(summary: S, content: C) -> Self {
        let content = content.into();
        Self::new(MessageBody::AiProcessing {
            summary: summary.into(),
            thoughts: content.clone(),
            content,
        })
    }

    pub fn error<S: Into<String>>(text: S) -> Self {
        Self::new(MessageBody::Error(text.into()))
    }

    /// Replace the internal notes of a processing message
    pub fn with_thoughts<C: Into<Content>>(mut self, notes: C) -> Self {
        if let MessageBody::AiProcessing { thoughts, .. } = &mut self.body {
            *thoughts = notes.into();
        }
        self
    }

    pub fn with_tool_name<S: Into<String>>(mut self, tool_name: S) -> Self {
        self.tool_name = tool_name.into();
        self
    }

    /// Keep the message out of the client stream
    pub fn hidden(mut self) -> Self {
        self.show_user = false;
        self
    }

    pub fn message_type(&self) -> MessageType {
        match self.body {
            MessageBody::UserText(_) => MessageType::UserTextMessage,
            MessageBody::AiText(_) => MessageType::AiTextMessage,
            MessageBody::AiMap(_) => MessageType::AiMapMessage,
            MessageBody::AiProcessing { .. } => MessageType::AiProcessingMessage,
            MessageBody::Error(_) => MessageType::Error,
        }
    }

    /// The value half of the wire view
    pub fn value(&self) -> Content {
        match &self.body {
            MessageBody::UserText(text) | MessageBody::Error(text) => Content::text(text.clone()),
            MessageBody::AiText(content) | MessageBody::AiMap(content) => content.clone(),
            MessageBody::AiProcessing {
                summary, content, ..
            } => Content::object([("summary", summary.clone()), ("content", content.clone())]),
        }
    }

    /// The `{type, value}` wire view. Streams inside it are shared with the message.
    pub fn to_wire(&self) -> Content {
        Content::object([
            ("type", Content::text(self.message_type().as_ref())),
            ("value", self.value()),
        ])
    }

    /// The model-replay view. Drains any stream the message holds.
    pub async fn to_role_and_content(&self) -> Vec<ReplayEntry> {
        match &self.body {
            MessageBody::UserText(text) => vec![ReplayEntry::user(text.clone())],
            MessageBody::AiText(content) => {
                vec![ReplayEntry::assistant(content.resolve_text().await)]
            }
            MessageBody::AiMap(_) => vec![ReplayEntry::assistant(MAP_REPLAY_TEXT)],
            MessageBody::AiProcessing {
                summary, thoughts, ..
            } => vec![
                ReplayEntry::assistant(summary.resolve_text().await).with_name(&self.tool_name),
                ReplayEntry::assistant(thoughts.resolve_text().await).with_name(&self.tool_name),
            ],
            MessageBody::Error(text) => vec![ReplayEntry::new(Role::Error, text.clone())],
        }
    }

    /// Take the immutable snapshot recorded in a conversation's history.
    ///
    /// This forces every stream in the message to be fully drained.
    pub async fn freeze(&self) -> ColdMessage {
        let role_and_content = self.to_role_and_content().await;
        let type_and_value = self.to_wire().resolve().await;
        ColdMessage::new(
            Uuid::new_v4(),
            self.message_type(),
            self.tool_name.clone(),
            self.show_user,
            role_and_content,
            type_and_value,
            Utc::now().timestamp(),
        )
    }
}
