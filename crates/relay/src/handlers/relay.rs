//! Relay socket: one WebSocket connection per page context.
//!
//! Requests arrive as `{id, command}` frames and are answered with
//! `{id, response}` frames, possibly out of order. Socket events for the
//! context are pushed as `{event}` frames. Closing the connection tears the
//! context down together with its proxied sockets.

use crate::state::AppState;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use burner_core::protocol::{Command, ContextId, RelayFrame, RelayRequest, Response};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// GET /v1/relay - Upgrade to the relay protocol.
pub async fn relay_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_relay(state, socket))
}

async fn serve_relay(state: AppState, socket: WebSocket) {
    let context = ContextId::new(Uuid::new_v4().to_string());
    let mut events = state.contexts.register(context.clone());
    tracing::info!(context = %context, "Page context connected");

    let (mut sink, mut stream) = socket.split();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<RelayFrame>();

    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(frame) = frames_rx.recv() => frame,
                Some(event) = events.recv() => RelayFrame::Event { event },
                else => break,
            };
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode relay frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let Some((id, command)) = decode_request(text.as_str(), &frames_tx) else {
            continue;
        };

        let dispatcher = state.dispatcher.clone();
        let context = context.clone();
        let frames_tx = frames_tx.clone();
        tokio::spawn(async move {
            let response = dispatcher.handle(command, &context).await;
            let _ = frames_tx.send(RelayFrame::Reply { id, response });
        });
    }

    state.contexts.unregister(&context);
    state.sockets.close_context(&context);
    writer.abort();
    tracing::info!(context = %context, "Page context disconnected");
}

/// Decode a request frame. Frames with a readable id but an unknown command
/// are answered with a failure; frames without an id are dropped.
fn decode_request(
    text: &str,
    frames: &mpsc::UnboundedSender<RelayFrame>,
) -> Option<(u64, Command)> {
    match serde_json::from_str::<RelayRequest>(text) {
        Ok(request) => Some((request.id, request.command)),
        Err(e) => {
            let id = serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| v.get("id").and_then(Value::as_u64));
            match id {
                Some(id) => {
                    let response =
                        Response::failure(format!("invalid command: {e}"), Some("invalid_request"));
                    let _ = frames.send(RelayFrame::Reply { id, response });
                }
                None => tracing::debug!(error = %e, "Dropping malformed relay frame"),
            }
            None
        }
    }
}
