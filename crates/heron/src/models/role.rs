use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// The author of an entry in the model-replay view
pub enum Role {
    System,
    User,
    Assistant,
    /// Only used internally, see `ConversationConfig::replay_errors`
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One entry of the model-replay view, as resubmitted to the generation service
pub struct ReplayEntry {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl ReplayEntry {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            name: None,
            content: content.into(),
        }
    }

    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attribute the entry to a named author, such as the tool that produced it
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        let name = name.into();
        self.name = if name.is_empty() { None } else { Some(name) };
        self
    }
}
