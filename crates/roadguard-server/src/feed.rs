//! Hospital live feed over WebSocket.
//!
//! Every connected observer receives `NEW_EVENT` / `UPDATE_EVENT` messages
//! as JSON text frames. Delivery is best effort: an observer that falls
//! behind skips what it missed and stays connected.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use roadguard_core::{FEED_CHANNEL, FeedMessage};
use tokio::sync::broadcast;

use crate::server::AppState;

pub async fn hospital_feed(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Subscribe before the upgrade so nothing published during the handshake is lost.
    let receiver = state.broadcaster.subscribe();
    ws.on_upgrade(move |socket| handle_feed(socket, receiver))
}

async fn handle_feed(socket: WebSocket, mut receiver: broadcast::Receiver<FeedMessage>) {
    let (mut ws_write, mut ws_read) = socket.split();

    tracing::info!(channel = FEED_CHANNEL, "Feed observer connected");

    // Observers never send anything meaningful; drain until close.
    let mut read_task = tokio::spawn(async move {
        while let Some(msg) = ws_read.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::debug!("Feed read error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            result = receiver.recv() => {
                match result {
                    Ok(message) => match serde_json::to_string(&message) {
                        Ok(json) => {
                            if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                                tracing::debug!("Feed write error: {}", e);
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                event_id = message.event_id(),
                                "Failed to serialize feed message: {}",
                                e
                            );
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Feed observer lagged, messages skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("Feed broadcaster closed");
                        break;
                    }
                }
            }
            _ = &mut read_task => {
                tracing::debug!("Feed observer went away");
                break;
            }
        }
    }

    read_task.abort();
    tracing::info!(channel = FEED_CHANNEL, "Feed observer disconnected");
}
