use heron::conversation::ConversationConfig;
use heron::orchestrator::Orchestrator;
use heron::providers::factory;
use heron::storage::JsonlStore;
use heron::tools::default_registry;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod configuration;
mod error;
mod routes;
mod state;

use configuration::Settings;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let settings = Settings::new()?;
    let addr = settings.server.socket_addr()?;

    let orchestrator_config = settings.generation.orchestrator_config();
    let provider = factory::get_provider(settings.provider.into_config(&settings.generation))?;
    let registry = default_registry();
    info!(tools = ?registry.names(), "Registered tools");
    let orchestrator = Orchestrator::new(provider, Arc::new(registry), orchestrator_config);

    info!(dir = %settings.storage.dir.display(), "Recording conversations");
    let store = JsonlStore::new(settings.storage.dir.clone());

    let state = AppState::new(
        orchestrator,
        store,
        ConversationConfig::from(&settings.conversation),
    );

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([http::HeaderName::from_static(
            routes::chat::CONVERSATION_ID_HEADER,
        )]);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
