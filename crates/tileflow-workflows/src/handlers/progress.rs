use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::SinkExt;
use tileflow_core::ProgressEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::handlers::types::AppState;

/// Subscribe to a tenant's progress events over WebSocket
///
/// Delivery is best-effort: a client that reads too slowly loses its
/// oldest events but keeps the stream. Unsolicited `{"type":"ping"}`
/// frames are answered with `{"type":"pong"}`.
#[utoipa::path(
    tag = "Progress",
    get,
    path = "/progress/ws/{tenant_id}",
    params(
        ("tenant_id" = String, Path, description = "Tenant id to stream events for")
    ),
    responses(
        (status = 101, description = "WebSocket stream of progress events")
    )
)]
pub async fn subscribe_progress(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    debug!(tenant_id, "progress stream requested");
    ws.on_upgrade(move |socket| handle_progress_socket(socket, state, tenant_id))
}

async fn handle_progress_socket(mut socket: WebSocket, state: Arc<AppState>, tenant_id: String) {
    let mut events = state.engine.subscribe(&tenant_id);
    debug!(tenant_id, "progress stream established");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(tenant_id, error = %e, "failed to serialize event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Slow consumer: old events discarded, stream stays up
                    warn!(tenant_id, skipped, "subscriber lagged, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    if is_ping(&text) {
                        let pong = serde_json::to_string(&ProgressEvent::Pong)
                            .expect("pong serializes");
                        if socket.send(Message::Text(pong.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(tenant_id, error = %e, "progress stream transport error");
                    break;
                }
            },
        }
    }

    debug!(tenant_id, "progress stream closed");
    let _ = socket.close().await;
}

fn is_ping(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| {
            value
                .get("type")
                .and_then(|t| t.as_str())
                .map(|t| t == "ping")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ping() {
        assert!(is_ping(r#"{"type":"ping"}"#));
        assert!(!is_ping(r#"{"type":"pong"}"#));
        assert!(!is_ping("not json"));
        assert!(!is_ping(r#"{"kind":"ping"}"#));
    }
}
