use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::message::MessageType;
use super::role::{ReplayEntry, Role};

/// An immutable snapshot of a message, with both projections already computed.
///
/// Cold messages are created exactly once, when a live message is appended to a
/// conversation, and are what gets persisted and rendered from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdMessage {
    id: Uuid,
    #[serde(rename = "type")]
    message_type: MessageType,
    #[serde(default)]
    tool_name: String,
    #[serde(default = "default_show_user")]
    show_user: bool,
    role_and_content: Vec<ReplayEntry>,
    type_and_value: Value,
    /// Unix timestamp in seconds
    created: i64,
}

fn default_show_user() -> bool {
    true
}

impl ColdMessage {
    pub fn new(
        id: Uuid,
        message_type: MessageType,
        tool_name: String,
        show_user: bool,
        role_and_content: Vec<ReplayEntry>,
        type_and_value: Value,
        created: i64,
    ) -> Self {
        Self {
            id,
            message_type,
            tool_name,
            show_user,
            role_and_content,
            type_and_value,
            created,
        }
    }

    /// Stand-in for a persisted record that could not be read back
    pub fn corrupt<S: Into<String>>(reason: S) -> Self {
        let text = reason.into();
        Self::new(
            Uuid::new_v4(),
            MessageType::Error,
            String::new(),
            true,
            vec![ReplayEntry::new(Role::Error, text.clone())],
            json!({"type": MessageType::Error.as_ref(), "value": text}),
            Utc::now().timestamp(),
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn show_user(&self) -> bool {
        self.show_user
    }

    pub fn role_and_content(&self) -> &[ReplayEntry] {
        &self.role_and_content
    }

    pub fn type_and_value(&self) -> &Value {
        &self.type_and_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_round_trip_keeps_both_views() {
        let cold = ColdMessage::new(
            Uuid::new_v4(),
            MessageType::AiTextMessage,
            "converse".to_string(),
            true,
            vec![ReplayEntry::assistant("hello")],
            json!({"type": "ai_text_message", "value": "hello"}),
            1_700_000_000,
        );

        let line = serde_json::to_string(&cold).unwrap();
        assert!(line.contains(r#""type":"ai_text_message""#));
        let back: ColdMessage = serde_json::from_str(&line).unwrap();
        assert_eq!(back, cold);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let value = json!({
            "id": Uuid::new_v4(),
            "type": "user_text_message",
            "role_and_content": [{"role": "user", "content": "hi"}],
            "type_and_value": {"type": "user_text_message", "value": "hi"},
            "created": 0
        });
        let cold: ColdMessage = serde_json::from_value(value).unwrap();
        assert!(cold.show_user());
        assert_eq!(cold.tool_name(), "");
    }

    #[test]
    fn test_corrupt_is_an_error_message() {
        let cold = ColdMessage::corrupt("unreadable record");
        assert_eq!(cold.message_type(), MessageType::Error);
        assert_eq!(cold.role_and_content()[0].role, Role::Error);
        assert_eq!(
            cold.type_and_value(),
            &json!({"type": "error", "value": "unreadable record"})
        );
    }
}
