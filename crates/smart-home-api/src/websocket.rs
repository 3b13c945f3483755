//! WebSocket handler for real-time updates
//!
//! Pushes state snapshots and outbound actuator commands to the client.
//! Text frames from the client are treated as sensor payloads.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use security_engine::StateSnapshot;
use sensor_protocol::ActuatorCommand;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

/// WebSocket events sent to clients
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    State {
        snapshot: StateSnapshot,
    },
    Command {
        topic: String,
        line: String,
        #[serde(flatten)]
        command: ActuatorCommand,
    },
    Rejected {
        error: String,
    },
}

impl From<ActuatorCommand> for WsEvent {
    fn from(command: ActuatorCommand) -> Self {
        Self::Command {
            topic: command.topic(),
            line: command.line(),
            command,
        }
    }
}

fn encode(event: &WsEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::warn!("Failed to encode WebSocket event: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(connected) = encode(&WsEvent::Connected) else {
        return;
    };
    if sender.send(connected).await.is_err() {
        return;
    }

    // Inbound payload errors are reported back on the same socket
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel::<WsEvent>();

    let mut state_rx = state.engine.subscribe();
    let mut command_rx = state.commands.subscribe();
    let send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                snapshot = state_rx.recv() => match snapshot {
                    Ok(snapshot) => WsEvent::State { snapshot },
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!("WebSocket client lagged by {} snapshots", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                command = command_rx.recv() => match command {
                    Ok(command) => command.into(),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket client missed {} commands", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };

            let Some(message) = encode(&event) else {
                continue;
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match state.engine.ingest(&text) {
                Ok(count) => tracing::debug!("Ingested {} readings over WebSocket", count),
                Err(e) => {
                    tracing::warn!("Dropping WebSocket payload: {}", e);
                    let _ = reply_tx.send(WsEvent::Rejected {
                        error: e.to_string(),
                    });
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    // Clean up
    send_task.abort();
}
