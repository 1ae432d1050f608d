//! Realtime session hub: the WebSocket surface viewers connect to.
//!
//! One session task per viewer. Each session runs a periodic push loop over
//! the telemetry cache and a command-dispatch loop over the inbound half of
//! the socket, joined by `tokio::select!`. Sessions are fully independent:
//! a malformed message or channel failure affects only the viewer that
//! caused it.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State as AxumState, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::telemetry::TelemetrySample;

/// Messages a viewer may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Connect,
    Disconnect,
    MotorSpeed { speed: i32 },
}

/// Messages the server pushes to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Status { connected: bool },
    Sensor(TelemetrySample),
    Error { message: String },
}

/// Lifecycle of one viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Closing,
    Closed,
}

/// Per-viewer runtime state.
struct Session {
    id: Uuid,
    state: SessionState,
}

/// Build the HTTP surface: banner, status, sample history, and the
/// WebSocket endpoint.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/status", get(status))
        .route("/samples", get(samples))
        .route("/ws", get(ws_handler))
        .with_state(ctx)
}

async fn banner() -> &'static str {
    "Sensor Bridge API"
}

/// `GET /status`: link state, the most recent sample, and how many samples
/// have been persisted.
async fn status(AxumState(ctx): AxumState<AppContext>) -> Json<serde_json::Value> {
    let stored = match &ctx.store {
        Some(store) => store.count().await.ok(),
        None => None,
    };
    Json(json!({
        "link": ctx.link.state(),
        "latest": ctx.cache.get(),
        "stored": stored,
    }))
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    limit: Option<i64>,
}

/// `GET /samples?limit=N`: most recently persisted samples, newest first.
async fn samples(
    AxumState(ctx): AxumState<AppContext>,
    Query(params): Query<RecentParams>,
) -> Json<serde_json::Value> {
    let limit = params.limit.unwrap_or(10).clamp(1, 1000);
    match &ctx.store {
        Some(store) => match store.recent(limit).await {
            Ok(rows) => Json(json!({ "samples": rows })),
            Err(err) => {
                warn!(error = %err, "sample query failed");
                Json(json!({ "samples": [], "error": err.to_string() }))
            }
        },
        None => Json(json!({ "samples": [] })),
    }
}

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    AxumState(ctx): AxumState<AppContext>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, ctx))
}

/// Drive one viewer session from connect to close.
async fn handle_session(socket: WebSocket, ctx: AppContext) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session {
        id: Uuid::new_v4(),
        state: SessionState::Open,
    };

    info!(session = %session.id, "viewer connected");

    if send(&mut sender, &ServerMessage::Status { connected: true })
        .await
        .is_err()
    {
        return;
    }

    let mut push = tokio::time::interval(ctx.push_interval());
    push.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick of a tokio interval completes immediately.
    push.tick().await;

    while session.state == SessionState::Open {
        tokio::select! {
            _ = push.tick() => {
                // A tick with an empty cache is skipped, not an empty message.
                if let Some(sample) = ctx.cache.get() {
                    if send(&mut sender, &ServerMessage::Sensor(sample)).await.is_err() {
                        session.state = SessionState::Closed;
                    }
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    dispatch(&text, &ctx, &mut sender, &mut session).await;
                }
                Some(Ok(Message::Ping(payload))) => {
                    if sender.send(Message::Pong(payload)).await.is_err() {
                        session.state = SessionState::Closed;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(session = %session.id, "viewer channel closed");
                    session.state = SessionState::Closed;
                }
                Some(Ok(_)) => {} // binary and pong frames are ignored
                Some(Err(err)) => {
                    warn!(session = %session.id, error = %err, "viewer channel error");
                    session.state = SessionState::Closed;
                }
            }
        }
    }

    info!(session = %session.id, "session finished");
}

/// Handle one inbound frame.
///
/// Parse failures and rejected device commands are reported to this viewer
/// only; the session stays open for everything except `Disconnect`.
async fn dispatch(
    text: &str,
    ctx: &AppContext,
    sender: &mut SplitSink<WebSocket, Message>,
    session: &mut Session,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(session = %session.id, error = %err, "malformed viewer message");
            let _ = send(
                sender,
                &ServerMessage::Error {
                    message: err.to_string(),
                },
            )
            .await;
            return;
        }
    };

    match message {
        ClientMessage::Connect => {
            // Idempotent: resend the status; the one push timer keeps running.
            let _ = send(sender, &ServerMessage::Status { connected: true }).await;
        }
        ClientMessage::Disconnect => {
            session.state = SessionState::Closing;
            let _ = send(sender, &ServerMessage::Status { connected: false }).await;
            let _ = sender.close().await;
            session.state = SessionState::Closed;
        }
        ClientMessage::MotorSpeed { speed } => {
            let command = format!("M{speed}\n");
            if let Err(err) = ctx.link.write(command.as_bytes()) {
                debug!(session = %session.id, error = %err, "motor command rejected");
                let _ = send(
                    sender,
                    &ServerMessage::Error {
                        message: "Serial port not connected".to_owned(),
                    },
                )
                .await;
            }
        }
    }
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}
