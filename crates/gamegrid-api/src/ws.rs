//! WebSocket event stream.
//!
//! Each connection is one `EventNotifier` subscriber. The client tags
//! itself with `{"type":"subscribe","channel":"servers","userId":...}` and
//! may `ping` at any time.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use gamegrid_events::{ClientMessage, EventMessage, EventNotifier};
use gamegrid_state::now_millis;
use tracing::{debug, info};

use crate::ApiState;

pub const WELCOME_MESSAGE: &str = "Connected to game server updates";

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    let notifier = state.orchestrator.notifier().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, notifier))
}

async fn handle_socket(mut socket: WebSocket, notifier: Arc<EventNotifier>) {
    let mut subscription = notifier.subscribe();
    let id = subscription.id;
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(subscriber = id, %session_id, "event stream connected");

    let welcome = EventMessage::Connection {
        message: WELCOME_MESSAGE.to_string(),
        session_id,
        timestamp: now_millis(),
    };
    if send(&mut socket, &welcome).await.is_err() {
        notifier.unsubscribe(id);
        return;
    }

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(msg) => notifier.handle_client_message(id, msg),
                    Err(e) => {
                        debug!(subscriber = id, error = %e, "ignoring malformed client message");
                        None
                    }
                };
                if let Some(reply) = reply {
                    if send(&mut socket, &reply).await.is_err() {
                        break;
                    }
                }
            }
            outbound = subscription.receiver.recv() => {
                // None: dropped by the notifier as a slow consumer.
                let Some(event) = outbound else { break };
                if send(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    notifier.unsubscribe(id);
    info!(subscriber = id, "event stream closed");
}

async fn send(socket: &mut WebSocket, message: &EventMessage) -> Result<(), axum::Error> {
    socket.send(Message::Text(message.to_json().into())).await
}
