use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::error::QuizError;
use crate::quiz::messages::{ClientMessage, ServerMessage};
use crate::quiz::room::ConnHandle;
use crate::quiz::QuizServer;

/// Runs one websocket connection: a spawned task drains the outbound channel
/// into the socket while this loop feeds inbound events to the orchestrator.
/// On close, the connection is unbound from every room.
pub async fn handle_websocket(websocket: WebSocket, server: Arc<QuizServer>) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn = ConnHandle::new(tx);
    tracing::info!(conn_id = conn.id, "New quiz WebSocket connection established");

    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::debug!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => handle_websocket_message(&server, &conn, message).await,
            Err(e) => {
                tracing::debug!(conn_id = conn.id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    server.disconnect(&conn).await;
    sender_task.abort();
    tracing::info!(conn_id = conn.id, "WebSocket connection closed");
}

async fn handle_websocket_message(server: &QuizServer, conn: &ConnHandle, message: Message) {
    // Pings, pongs, and binary frames are not part of the protocol.
    let Ok(text) = message.to_str() else {
        return;
    };

    match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_message) => {
            tracing::debug!(conn_id = conn.id, "Received client message: {}", text);
            server.handle_message(conn, client_message).await;
        }
        Err(e) => {
            tracing::debug!(
                conn_id = conn.id,
                error = %e,
                raw_message = %text,
                "Failed to parse client message"
            );
            conn.send(&ServerMessage::Error {
                message: QuizError::MalformedMessage.to_string(),
            });
        }
    }
}
