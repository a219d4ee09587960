use axum::{
    extract::State,
    http::{self, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use heron::conversation::Conversation;
use heron::encoder::encode_messages;
use heron::models::message::MessageType;
use heron::orchestrator::Orchestrator;
use heron::storage::{validate_conversation_id, JsonlStore, Recorder};
use serde::{Deserialize, Serialize};
use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::state::AppState;

pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

/// How often an idle turn checks whether the client is still listening
const HEARTBEAT: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(rename = "type")]
    message_type: String,
    value: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ErrorReply = (StatusCode, Json<ErrorResponse>);

fn error_reply(status: StatusCode, error: impl ToString) -> ErrorReply {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

/// The body of a turn: a JSON array written while it is generated
struct JsonStreamResponse {
    rx: ReceiverStream<String>,
    conversation_id: String,
}

impl JsonStreamResponse {
    fn new(rx: ReceiverStream<String>, conversation_id: String) -> Self {
        Self {
            rx,
            conversation_id,
        }
    }
}

impl Stream for JsonStreamResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for JsonStreamResponse {
    fn into_response(self) -> axum::response::Response {
        let conversation_id = self.conversation_id.clone();
        let body = axum::body::Body::from_stream(self);

        http::Response::builder()
            .header("Content-Type", "application/json")
            .header("Cache-Control", "no-cache")
            .header(CONVERSATION_ID_HEADER, conversation_id)
            .body(body)
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build the chat response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
    }
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<JsonStreamResponse, ErrorReply> {
    match request.message_type.parse::<MessageType>() {
        Ok(MessageType::UserTextMessage) => {}
        _ => {
            return Err(error_reply(
                StatusCode::BAD_REQUEST,
                format!("Unsupported message type: {}", request.message_type),
            ))
        }
    }

    let conversation_id = request
        .conversation_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    validate_conversation_id(&conversation_id)
        .map_err(|e| error_reply(StatusCode::BAD_REQUEST, e))?;

    let history = state.store.load(&conversation_id).await.map_err(|e| {
        tracing::error!(conversation_id = %conversation_id, error = %e, "Failed to load history");
        error_reply(StatusCode::INTERNAL_SERVER_ERROR, e)
    })?;
    let is_new = history.is_empty();
    let recorder: Arc<dyn Recorder> = state.store.clone();
    let conversation = Conversation::from_history(conversation_id.clone(), history, recorder)
        .with_config(state.conversation_config);

    let (tx, rx) = mpsc::channel(100);
    let orchestrator = state.orchestrator.clone();
    let store = state.store.clone();
    let user_message = request.value;

    tokio::spawn(async move {
        let finished = forward_turn(&orchestrator, &conversation, &user_message, tx).await;
        if finished && is_new {
            name_conversation(&orchestrator, &store, &conversation).await;
        }
    });

    Ok(JsonStreamResponse::new(ReceiverStream::new(rx), conversation_id))
}

/// Pull the turn into `tx` until it ends, returning false if the client went away first.
///
/// `tx` is dropped on return, which ends the response body.
async fn forward_turn(
    orchestrator: &Orchestrator,
    conversation: &Conversation,
    user_message: &str,
    tx: mpsc::Sender<String>,
) -> bool {
    let mut fragments = encode_messages(orchestrator.reply(conversation, user_message));

    loop {
        match timeout(HEARTBEAT, fragments.next()).await {
            Ok(Some(fragment)) => {
                if tx.send(fragment).await.is_err() {
                    break;
                }
            }
            Ok(None) => return true,
            // Heartbeat, stops pulling from the provider once nobody is reading
            Err(_) => {
                if tx.is_closed() {
                    break;
                }
            }
        }
    }
    tracing::info!(conversation_id = %conversation.id(), "Client went away, ending the turn");
    false
}

/// Title a conversation after its first turn
async fn name_conversation(
    orchestrator: &Orchestrator,
    store: &JsonlStore,
    conversation: &Conversation,
) {
    match orchestrator.generate_title(conversation).await {
        Ok(title) => {
            if let Err(e) = store.save_title(conversation.id(), &title).await {
                tracing::error!(
                    conversation_id = %conversation.id(),
                    error = %e,
                    "Failed to save title"
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                conversation_id = %conversation.id(),
                error = %e,
                "Could not generate a title"
            );
        }
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handler))
        .with_state(state)
}
