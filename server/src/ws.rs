use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::connection::{CloseReason, ConnectionLifecycle};
use crate::relay_loop::{Inbound, RelayCommand};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub relay_tx: mpsc::Sender<RelayCommand>,
    pub outbox_capacity: usize,
    /// Static assets answering plain GETs on the WebSocket path.
    pub static_dir: Option<PathBuf>,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, app_state))
}

/// `/` serves both the browser page and the WebSocket the page opens on the
/// same host and port. Requests without upgrade headers go to the static files.
pub async fn root_handler(State(app_state): State<AppState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &app_state).await {
        Ok(ws) => ws.on_upgrade(|socket| handle_socket(socket, app_state)),
        Err(rejection) => match &app_state.static_dir {
            Some(dir) => {
                let request = Request::from_parts(parts, body);
                match ServeDir::new(dir).oneshot(request).await {
                    Ok(response) => response.into_response(),
                    Err(never) => match never {},
                }
            }
            None => rejection.into_response(),
        },
    }
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut lifecycle = ConnectionLifecycle::new();

    // Join the relay. assign_id is already queued in the outbox when the id
    // comes back, ahead of any broadcast.
    let (outbox, mut outbox_rx) = mpsc::channel(app_state.outbox_capacity);
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .relay_tx
        .send(RelayCommand::Join {
            outbox,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Join command");
        return;
    }

    let my_id = match resp_rx.await {
        Ok(id) => id,
        Err(_) => {
            tracing::error!("Failed to receive player id");
            return;
        }
    };
    lifecycle.open();

    let reason = loop {
        tokio::select! {
            // Client -> Relay
            msg = stream.next() => {
                let payload = match msg {
                    Some(Ok(Message::Text(text))) => Inbound::Text(text),
                    Some(Ok(Message::Binary(bytes))) => Inbound::Binary(bytes),
                    Some(Ok(Message::Close(_))) | None => break CloseReason::Graceful,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error for player {}: {}", my_id, e);
                        break CloseReason::TransportError;
                    }
                    Some(Ok(_)) => continue, // Ping/pong handled by axum
                };
                if app_state
                    .relay_tx
                    .send(RelayCommand::Message { sender_id: my_id, payload })
                    .await
                    .is_err()
                {
                    break CloseReason::RelayGone;
                }
            }

            // Relay -> Client
            frame = outbox_rx.recv() => {
                let Some(frame) = frame else {
                    break CloseReason::RelayGone;
                };
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    tracing::warn!("Send to player {} failed: {}", my_id, e);
                    break CloseReason::TransportError;
                }
            }
        }
    };

    // Single exit from the loop; a duplicate Leave would still be absorbed by
    // Registry::unregister.
    if lifecycle.close(reason) {
        // Stop accepting frames before the registry hears about the departure.
        outbox_rx.close();
        let _ = app_state
            .relay_tx
            .send(RelayCommand::Leave { id: my_id })
            .await;
        tracing::info!("Player {} disconnected ({:?})", my_id, reason);
    }
}
