// WebSocket bridge between the in-process event bus and browser views.
//
// Each connection subscribes to the bus and receives every sync event as a
// JSON text frame; a connected client may also publish events (its own week
// navigations, say) by sending the same JSON shape back. Source tags pass
// through untouched, so browser-side views do their own echo suppression.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::services::bus::SyncEvent;
use crate::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Bus handlers are synchronous; hand events to this connection's
    // sender task through a channel.
    let (tx, mut rx) = mpsc::unbounded_channel::<SyncEvent>();
    let subscription = state.bus.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::error!("failed to serialize sync event: {err}");
                    continue;
                }
            };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<SyncEvent>(&text) {
                Ok(event) => state.bus.emit(event),
                Err(err) => {
                    tracing::warn!("ignoring malformed client event: {err}");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    subscription.unsubscribe();
    send_task.abort();
}
