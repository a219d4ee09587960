use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::cold::ColdMessage;
use crate::models::message::Message;
use crate::models::role::{ReplayEntry, Role};
use crate::storage::{NoopRecorder, Recorder};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationConfig {
    /// Whether error messages are included when history is replayed to the model
    pub replay_errors: bool,
}

/// Append-only history of frozen messages.
///
/// A conversation is owned by the single turn processing it. Appends go through a shared
/// reference so tools can read the history while the orchestrator records their output.
pub struct Conversation {
    id: String,
    history: RwLock<Vec<ColdMessage>>,
    recorder: Arc<dyn Recorder>,
    config: ConversationConfig,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_history(id, Vec::new(), Arc::new(NoopRecorder))
    }

    /// Resume a conversation whose history was loaded from storage
    pub fn from_history(
        id: impl Into<String>,
        history: Vec<ColdMessage>,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        Self {
            id: id.into(),
            history: RwLock::new(history),
            recorder,
            config: ConversationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ConversationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// A snapshot of the history
    pub fn history(&self) -> Vec<ColdMessage> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ColdMessage>> {
        self.history.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Freeze a message, hand it to the recorder, then add it to the history.
    ///
    /// Freezing drains every stream the message holds. A failing recorder is logged and
    /// does not stop the message from being added.
    pub async fn append(&self, message: &Message) -> ColdMessage {
        let frozen = message.freeze().await;
        if let Err(e) = self.recorder.record(&frozen, &self.id).await {
            tracing::error!(
                conversation_id = %self.id,
                message_id = %frozen.id(),
                error = %e,
                "Failed to record message"
            );
        }
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frozen.clone());
        frozen
    }

    /// Render the history for the generation service.
    ///
    /// Starts with `system_message`, then every frozen replay entry in order. When `request`
    /// is given, a final user entry asks the model to address it first.
    pub fn render_model_replay(
        &self,
        system_message: &str,
        request: Option<&str>,
    ) -> Vec<ReplayEntry> {
        let history = self.read();
        let mut entries = vec![ReplayEntry::system(system_message)];
        entries.extend(
            history
                .iter()
                .flat_map(|message| message.role_and_content().iter())
                .filter(|entry| self.config.replay_errors || entry.role != Role::Error)
                .cloned(),
        );
        if let Some(request) = request {
            entries.push(ReplayEntry::user(format!(
                "First address the following request: {}",
                request
            )));
        }
        entries
    }

    /// Render the history as the client sees it
    pub fn render_wire(&self) -> Vec<Value> {
        self.read()
            .iter()
            .filter(|message| message.show_user())
            .map(|message| message.type_and_value().clone())
            .collect()
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
