// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser WebSocket: every relay event is pushed to every connected client.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

/// `GET /ws`: WebSocket upgrade for the browser event stream.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket))
}

async fn handle_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = state.events.subscribe();
    tracing::debug!("browser client connected");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            event = events.recv() => {
                let event = match event {
                    Ok(e) => e,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "browser client lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
    tracing::debug!("browser client disconnected");
}
