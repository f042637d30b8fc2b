//! WebSocket handler
//!
//! Upgrades `GET /stream` connections and bridges them to the hub. The
//! initial filter comes from the query string (every parameter except
//! `query` becomes a label equality); clients may replace it later with a
//! `{"type":"filter","labels":{...}}` message.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::stream::hub::StreamHub;
use crate::stream::messages::{ClientFrame, ServerFrame};

/// Subscriber read-idle limit; any inbound message resets it
const READ_IDLE: Duration = Duration::from_secs(60);

/// GET /stream
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let filter: HashMap<String, String> = params
        .into_iter()
        .filter(|(key, _)| key != "query")
        .collect();

    let hub = Arc::clone(&state.hub);
    let token = state.http_shutdown.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, filter, token))
}

async fn handle_socket(
    socket: WebSocket,
    hub: Arc<StreamHub>,
    filter: HashMap<String, String>,
    mut token: crate::lifecycle::ShutdownToken,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut sub = hub.subscribe(filter.clone()).await;

    let welcome = ServerFrame::Connected {
        message: "Connected to log stream".to_string(),
        filter,
    };
    if send_frame(&mut sender, &welcome).await.is_err() {
        hub.unsubscribe(sub.id).await;
        return;
    }

    loop {
        tokio::select! {
            frame = sub.frames.recv() => match frame {
                Some(ServerFrame::Ping) => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                Some(frame) => {
                    if send_frame(&mut sender, &frame).await.is_err() {
                        break;
                    }
                }
                // Evicted by the hub, or the hub shut down.
                None => break,
            },
            incoming = timeout(READ_IDLE, receiver.next()) => match incoming {
                Err(_) => {
                    tracing::debug!(subscriber = %sub.id, "Read idle timeout");
                    break;
                }
                Ok(None) | Ok(Some(Err(_))) => break,
                Ok(Some(Ok(message))) => {
                    if !handle_message(&hub, sub.id, message).await {
                        break;
                    }
                }
            },
            _ = token.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    hub.unsubscribe(sub.id).await;
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize frame");
            Ok(())
        }
    }
}

/// Returns false when the connection should close
async fn handle_message(hub: &Arc<StreamHub>, id: Uuid, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Filter { labels }) => {
                    if hub.update_filter(id, labels.clone()).await {
                        let _ = hub
                            .send_to(id, ServerFrame::FilterUpdated { filter: labels })
                            .await;
                    }
                }
                Ok(ClientFrame::Ping) => {}
                Err(e) => {
                    tracing::debug!(subscriber = %id, error = %e, "Invalid client message");
                    let _ = hub
                        .send_to(
                            id,
                            ServerFrame::Error {
                                message: format!("invalid message: {}", e),
                            },
                        )
                        .await;
                }
            }
            true
        }
        Message::Binary(_) => {
            let _ = hub
                .send_to(
                    id,
                    ServerFrame::Error {
                        message: "binary messages not supported".to_string(),
                    },
                )
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(subscriber = %id, "Client requested close");
            false
        }
    }
}
