//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.
//! A connection receives nothing until it registers for a user; from then on
//! it is a hub listener scoped to that user until it closes, re-registers or
//! the user's session is stopped. A stop is announced with a `stopped`
//! connection message and the socket stays open for a new registration.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::{status, ClientMessage, ServerMessage};
use crate::api::AppState;
use crate::hub::{FanoutHub, ListenerError, Subscription};

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Per-connection bookkeeping
struct Connection {
    id: String,
    hub: Arc<FanoutHub>,
    tx: mpsc::UnboundedSender<ServerMessage>,
    subscription: Option<Subscription>,
}

impl Connection {
    fn send(&self, message: ServerMessage) {
        // Only fails once the writer task is gone, i.e. the socket is closing
        let _ = self.tx.send(message);
    }

    fn register(&mut self, user_id: String) {
        if user_id.trim().is_empty() {
            self.send(ServerMessage::error("userId is required"));
            return;
        }

        if let Some(previous) = self.subscription.take() {
            self.hub.unsubscribe(&previous);
        }

        let tx = self.tx.clone();
        let release_tx = self.tx.clone();
        let released_user = user_id.clone();
        let result = self.hub.subscribe_user_with_release(
            user_id.clone(),
            move |update| {
                tx.send(ServerMessage::sensor_update(update.clone()))
                    .map_err(|_| ListenerError::Disconnected)
            },
            move || {
                let _ = release_tx.send(ServerMessage::Connection {
                    status: status::STOPPED.to_string(),
                    message: format!(
                        "Monitoring stopped for {}; register again to resume",
                        released_user
                    ),
                    user_id: Some(released_user),
                });
            },
        );

        match result {
            Ok(subscription) => {
                tracing::info!(
                    connection_id = %self.id,
                    user_id = %user_id,
                    "WebSocket registered"
                );
                self.subscription = Some(subscription);
                self.send(ServerMessage::Connection {
                    status: status::REGISTERED.to_string(),
                    message: format!("Streaming sensor updates for {}", user_id),
                    user_id: Some(user_id),
                });
            }
            Err(e) => {
                tracing::error!(
                    connection_id = %self.id,
                    user_id = %user_id,
                    error = %e,
                    "Failed to register WebSocket listener"
                );
                self.send(ServerMessage::error(e.to_string()));
            }
        }
    }

    /// Handle a received frame; returns false if the connection should close
    fn handle_frame(&mut self, frame: Message) -> bool {
        match frame {
            Message::Text(text) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Register { user_id }) => self.register(user_id),
                    Ok(ClientMessage::Ping) => self.send(ServerMessage::Pong),
                    Ok(ClientMessage::Unknown) => {
                        tracing::debug!(
                            connection_id = %self.id,
                            text = %text,
                            "Ignoring unknown message type"
                        );
                    }
                    Err(e) => {
                        tracing::debug!(
                            connection_id = %self.id,
                            error = %e,
                            "Invalid client message"
                        );
                        self.send(ServerMessage::error(format!(
                            "Invalid message format: {}",
                            e
                        )));
                    }
                }
                true
            }
            Message::Binary(_) => {
                self.send(ServerMessage::error("Binary messages not supported"));
                true
            }
            // Axum answers pings itself
            Message::Ping(_) | Message::Pong(_) => true,
            Message::Close(_) => {
                tracing::debug!(connection_id = %self.id, "Client requested close");
                false
            }
        }
    }

    fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.hub.unsubscribe(&subscription);
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<FanoutHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let mut connection = Connection {
        id: uuid::Uuid::new_v4().to_string(),
        hub,
        tx,
        subscription: None,
    };
    tracing::debug!(connection_id = %connection.id, "WebSocket connected");

    connection.send(ServerMessage::Connection {
        status: status::CONNECTED.to_string(),
        user_id: None,
        message: "Connected to biosense stream; send a register message".to_string(),
    });

    let conn_id_for_send = connection.id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        tracing::debug!(
                            connection_id = %conn_id_for_send,
                            "WebSocket send failed, closing connection"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            frame = receiver.next() => match frame {
                Some(Ok(frame)) => {
                    if !connection.handle_frame(frame) {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(
                        connection_id = %connection.id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => break,
            },
        }
    }

    connection.close();
    send_task.abort();
    tracing::debug!(connection_id = %connection.id, "WebSocket closed");
}
