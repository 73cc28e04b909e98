//! WebSocket glue between the transport and the registry.
//!
//! The surrounding service owns the HTTP listener; it mounts
//! [`router`] (or [`ws_handler`] directly) on its own axum router and passes
//! the shared registry in as state.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::ClientMessage;
use crate::config::RealtimeConfig;
use crate::registry::ConnectionRegistry;

/// Shared state for the WebSocket endpoint.
#[derive(Clone)]
pub struct RealtimeState {
    pub registry: Arc<ConnectionRegistry>,
    pub config: RealtimeConfig,
}

/// Builds a router exposing the realtime endpoint at `/ws`.
pub fn router(registry: Arc<ConnectionRegistry>, config: RealtimeConfig) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(RealtimeState { registry, config })
}

/// Upgrades the connection and hands it to the registry.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RealtimeState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry, state.config))
}

/// Per-connection pump: outbound frames from the registry, inbound client
/// messages to it.
async fn handle_socket(socket: WebSocket, registry: Arc<ConnectionRegistry>, config: RealtimeConfig) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel(config.outbound_capacity);
    let id = registry.register(outbound_tx);

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            debug!(client_id = %id, error = %e, "WebSocket write failed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(client_id = %id, event = %frame.event, error = %e, "Failed to serialize frame");
                    }
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(message) => registry.handle_message(id, message),
                            Err(e) => {
                                // A malformed message never drops the
                                // connection, only the message.
                                debug!(client_id = %id, error = %e, "Unparseable client message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client_id = %id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    registry.unregister(id);
}
