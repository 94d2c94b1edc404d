// Per-socket driver: one browser WebSocket, one RelaySession
//
// The reader loop feeds frames into the session; the writer loop drains the
// session's event channel into the socket. Both live in a JoinSet scoped to
// this function. When either loop ends, the other is aborted and the session
// is closed.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::config::RelaySettings;
use super::messages::{ClientMessage, ServerEvent};
use super::session::{AudioDisposition, RelaySession};
use crate::upstream::UpstreamConnector;

/// Serve one client connection until it closes
pub async fn serve_socket(
    socket: WebSocket,
    connector: Arc<dyn UpstreamConnector>,
    settings: RelaySettings,
) {
    let connection_id = format!("conn-{}", uuid::Uuid::new_v4());
    info!("Client connected: {}", connection_id);

    let (sender, receiver) = socket.split();
    let (events_tx, events_rx) = mpsc::channel(settings.client_channel_capacity);

    let session = RelaySession::open(connection_id.clone(), settings, connector, events_tx).await;

    let mut loops = JoinSet::new();
    loops.spawn(write_events(sender, events_rx, connection_id.clone()));
    loops.spawn(read_frames(receiver, Arc::clone(&session)));

    if let Some(Err(e)) = loops.join_next().await {
        if e.is_panic() {
            error!("Connection {}: loop panicked: {}", connection_id, e);
        }
    }
    loops.shutdown().await;

    session.close().await;
    info!("Client disconnected: {}", connection_id);
}

async fn read_frames(mut receiver: SplitStream<WebSocket>, session: Arc<RelaySession>) {
    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("Session {}: client socket error: {}", session.id(), e);
                break;
            }
        };

        match message {
            Message::Binary(pcm) => {
                if session.accept_audio(pcm) == AudioDisposition::Rejected {
                    debug!("Session {}: rejected audio frame", session.id());
                }
            }
            Message::Text(text) => match ClientMessage::parse(&text) {
                Ok(control) => session.handle_control(control).await,
                Err(e) => warn!("Session {}: {}", session.id(), e),
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn write_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut events: mpsc::Receiver<ServerEvent>,
    connection_id: String,
) {
    while let Some(event) = events.recv().await {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Connection {}: failed to encode event: {}", connection_id, e);
                continue;
            }
        };
        if sender.send(Message::Text(payload)).await.is_err() {
            debug!("Connection {}: client socket closed", connection_id);
            break;
        }
    }
}
