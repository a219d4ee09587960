use heron::conversation::ConversationConfig;
use heron::orchestrator::Orchestrator;
use heron::storage::JsonlStore;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<JsonlStore>,
    pub conversation_config: ConversationConfig,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        store: JsonlStore,
        conversation_config: ConversationConfig,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            store: Arc::new(store),
            conversation_config,
        }
    }
}
