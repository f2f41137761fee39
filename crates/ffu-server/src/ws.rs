use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use ffu_core::StatusEvent;
use tracing::{debug, info};

use crate::api::AppState;

// GET /ws/status
pub async fn ws_status(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // Subscribe before reading the snapshot so nothing published in between is missed.
    let mut subscription = state.manager.subscribe();
    let id = subscription.id();
    info!(subscriber = id, "Client connected");

    let greeting = StatusEvent::new("connected", state.manager.status().await);
    if send_event(&mut socket, &greeting).await {
        let mut shutdown = state.shutdown.clone();
        loop {
            tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => {
                        if !send_event(&mut socket, &event).await {
                            break;
                        }
                    }
                    None => break,
                },
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                _ = shutdown.changed() => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    state.manager.unsubscribe(id);
    info!(subscriber = id, "Client disconnected");
}

async fn send_event(socket: &mut WebSocket, event: &StatusEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            debug!("Failed to encode status event: {}", e);
            true
        }
    }
}
