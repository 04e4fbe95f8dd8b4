//! WebSocket server + REST endpoints for a discovery session.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cards::Vote;
use crate::channels::VoiceChannel;
use crate::engine::{DiscoveryEngine, EngineEvent, TranscriptInput};
use crate::error::{Error, SessionError};
use crate::gate::GateTrigger;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DiscoveryEngine>,
    /// Present when the session runs over voice; transport events land here.
    pub voice: Option<Arc<VoiceChannel>>,
}

/// Build the Axum router with session WebSocket and REST routes.
pub fn routes(engine: Arc<DiscoveryEngine>, voice: Option<Arc<VoiceChannel>>) -> Router {
    let state = AppState { engine, voice };

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/session", get(get_session))
        .route("/api/transcripts", post(post_transcript))
        .route("/api/triggers", post(post_trigger))
        .route("/api/cards/{id}/vote", post(vote_card))
        .route("/api/turns/{id}", patch(edit_turn).delete(remove_turn))
        .route("/api/voice/response", post(voice_response))
        .route("/api/voice/ack", post(voice_ack))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "discovery-guide",
        "mode": state.engine.mode(),
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

/// Actions a client can send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientAction {
    Vote { card_id: String, vote: Option<Vote> },
    Trigger { trigger: GateTrigger },
    Transcript(TranscriptInput),
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state.engine))
}

async fn handle_socket(socket: WebSocket, engine: Arc<DiscoveryEngine>) {
    info!("WebSocket client connected");
    let (mut sink, mut stream) = socket.split();

    // Subscribe before the sync so nothing between the two is lost.
    let mut rx = engine.subscribe();

    if send_event(&mut sink, &engine.sync_event().await).await.is_err() {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if send_event(&mut sink, &event).await.is_err() {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                        if send_event(&mut sink, &engine.sync_event().await).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = stream.next() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &engine).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

async fn send_event<S>(sink: &mut S, event: &EngineEvent) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize engine event");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}

async fn handle_client_message(text: &str, engine: &Arc<DiscoveryEngine>) {
    match serde_json::from_str::<ClientAction>(text) {
        Ok(ClientAction::Vote { card_id, vote }) => {
            if let Err(e) = engine.record_vote(&card_id, vote).await {
                warn!(card_id = %card_id, error = %e, "Vote via WS failed");
            }
        }
        Ok(ClientAction::Trigger { trigger }) => spawn_trigger(engine, trigger),
        Ok(ClientAction::Transcript(input)) => spawn_transcript(engine, input),
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
        }
    }
}

/// Run the turn pipeline off the request path; results arrive as events.
fn spawn_transcript(engine: &Arc<DiscoveryEngine>, input: TranscriptInput) {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        if let Err(e) = engine.handle_transcript(input).await {
            warn!(error = %e, "Transcript handling failed");
        }
    });
}

fn spawn_trigger(engine: &Arc<DiscoveryEngine>, trigger: GateTrigger) {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        engine.trigger(trigger).await;
    });
}

// ── REST Endpoints ──────────────────────────────────────────────────────

async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.view().await)
}

async fn post_transcript(
    State(state): State<AppState>,
    Json(input): Json<TranscriptInput>,
) -> impl IntoResponse {
    if input.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Transcript text is empty"})),
        );
    }
    spawn_transcript(&state.engine, input);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"status": "accepted"})),
    )
}

#[derive(Deserialize)]
struct TriggerBody {
    trigger: GateTrigger,
}

async fn post_trigger(
    State(state): State<AppState>,
    Json(body): Json<TriggerBody>,
) -> impl IntoResponse {
    spawn_trigger(&state.engine, body.trigger);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"status": "accepted", "trigger": body.trigger})),
    )
}

#[derive(Deserialize)]
struct VoteBody {
    /// `1` saved, `0` maybe, `-1` skipped, `null` to clear.
    vote: Option<Vote>,
}

async fn vote_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<VoteBody>,
) -> impl IntoResponse {
    match state.engine.record_vote(&id, body.vote).await {
        Ok(previous) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "recorded",
                "card_id": id,
                "vote": body.vote,
                "previous": previous,
            })),
        ),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct EditBody {
    text: String,
}

async fn edit_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EditBody>,
) -> impl IntoResponse {
    let Ok(turn_id) = Uuid::parse_str(&id) else {
        return invalid_turn_id();
    };
    match state.engine.edit_turn(turn_id, body.text).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "updated"}))),
        Err(e) => error_response(e),
    }
}

async fn remove_turn(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(turn_id) = Uuid::parse_str(&id) else {
        return invalid_turn_id();
    };
    match state.engine.remove_turn(turn_id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "removed"}))),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ResponseState {
    Started,
    Completed,
}

#[derive(Deserialize)]
struct VoiceResponseBody {
    state: ResponseState,
}

async fn voice_response(
    State(state): State<AppState>,
    Json(body): Json<VoiceResponseBody>,
) -> impl IntoResponse {
    let Some(voice) = state.voice.as_ref() else {
        return not_voice();
    };
    match body.state {
        ResponseState::Started => voice.response_started(),
        ResponseState::Completed => voice.response_completed(),
    }
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

#[derive(Deserialize)]
struct AckBody {
    item_id: String,
}

async fn voice_ack(State(state): State<AppState>, Json(body): Json<AckBody>) -> impl IntoResponse {
    let Some(voice) = state.voice.as_ref() else {
        return not_voice();
    };
    voice.acknowledge(body.item_id);
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

fn error_response(e: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &e {
        Error::Session(SessionError::UnknownCard { .. } | SessionError::UnknownTurn { .. }) => {
            StatusCode::NOT_FOUND
        }
        Error::Session(SessionError::InvalidVote { .. }) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({"error": e.to_string()})))
}

fn invalid_turn_id() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": "Invalid turn ID"})),
    )
}

fn not_voice() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({"error": "Session is not running over voice"})),
    )
}
