use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use heron::conversation::Conversation;
use heron::errors::StorageError;
use heron::storage::Recorder;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Replay a stored conversation in the same shape the chat route streams it
async fn hydrate(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let history = match state.store.load(&id).await {
        Ok(history) => history,
        Err(e) => {
            let status = match e {
                StorageError::InvalidConversationId(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(conversation_id = %id, error = %e, "Failed to hydrate conversation");
            return (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    let recorder: Arc<dyn Recorder> = state.store.clone();
    let conversation = Conversation::from_history(id, history, recorder);
    Json(conversation.render_wire()).into_response()
}

/// Every stored conversation with its title, most recent first
async fn list(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list().await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list conversations");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/conversations", get(list))
        .route("/conversations/:id", get(hydrate))
        .with_state(state)
}
