//! WebSocket handler for client connections.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::relay::ConnectionSession;

use super::types::{ClientMessage, ServerEvent};

/// Size of the per-connection outbound event buffer.
const EVENT_BUFFER_SIZE: usize = 64;

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Handle one WebSocket connection.
///
/// All processing for the connection is sequential: one inbound message is
/// fully drained before the next is read. A dedicated task forwards
/// outbound events to the socket so the engine stream is never blocked on a
/// slow client.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(engine) = state.engine.clone() else {
        error!("Rejecting WebSocket connection: agent engine not initialized");
        let event = ServerEvent::Error {
            data: "Agent not initialized.".to_string(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            let _ = sender.send(Message::Text(json.into())).await;
        }
        let _ = sender.close().await;
        return;
    };

    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(EVENT_BUFFER_SIZE);

    // Forward outbound events to the client.
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize event: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session =
        ConnectionSession::new(engine, state.diagnostics.clone(), event_tx.clone());
    info!(
        "WebSocket connection opened (conversation {})",
        session.conversation_id()
    );

    while let Some(incoming) = receiver.next().await {
        match incoming {
            Ok(Message::Text(text)) => match ClientMessage::parse(&text) {
                Ok(message) => {
                    if let Err(e) = session.handle(message).await {
                        error!(
                            "WebSocket error (conversation {}): {e:?}",
                            session.conversation_id()
                        );
                        let _ = event_tx
                            .send(ServerEvent::Error {
                                data: e.to_string(),
                            })
                            .await;
                        break;
                    }
                }
                Err(e) => {
                    warn!("Ignoring unparseable client message: {e}");
                }
            },
            Ok(Message::Close(_)) => {
                info!(
                    "Client closed connection (conversation {})",
                    session.conversation_id()
                );
                break;
            }
            Ok(_) => {
                // Binary, ping and pong frames are not part of the protocol.
            }
            Err(e) => {
                warn!(
                    "WebSocket receive error (conversation {}): {e}",
                    session.conversation_id()
                );
                break;
            }
        }
    }

    let conversation_id = session.conversation_id().to_string();
    drop(session);
    drop(event_tx);
    // Let the send task flush anything still queued before the socket drops.
    let _ = send_task.await;
    info!("WebSocket connection closed (conversation {conversation_id})");
}
