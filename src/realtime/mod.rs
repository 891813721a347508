// SPDX-License-Identifier: AGPL-3.0-or-later

//! Realtime transport adapter: WebSocket handshake authentication and the
//! per-connection event loop.
//!
//! Authentication happens exactly once, at the upgrade request — the same
//! credential extraction and core state machine as the HTTP guard, so the
//! two transports cannot drift. A rejected handshake returns the generic
//! 401 and the socket never opens. If the handshake rotated credentials,
//! the new pair is delivered as the first server frame (`tokens` event):
//! cookies cannot be re-set on an established connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::guard::extract_credentials;
use crate::auth::AuthSession;
use crate::state::AppState;

pub mod registry;

pub use registry::{ConnectionRegistry, ServerEvent};

/// Frames a client may send after connecting.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum ClientMessage {
    /// Re-associate an identity with this connection for pushes.
    SubscribeNotifications { identity: String },
}

/// `GET /v1/realtime` — authenticate the handshake, then upgrade.
pub async fn realtime_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let credentials = extract_credentials(&headers);

    match state.core.verify(credentials).await {
        Ok(session) => ws.on_upgrade(move |socket| drive_connection(socket, state, session)),
        Err(e) => e.into_response(),
    }
}

/// Own one socket from upgrade to teardown.
async fn drive_connection(socket: WebSocket, state: AppState, session: AuthSession) {
    let identity = session.identity.clone();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let connection_id = state.registry.connect(&identity, tx.clone());
    tracing::debug!(identity = %identity, %connection_id, "realtime connection established");

    if let Some(pair) = &session.rotation {
        let _ = tx.send(ServerEvent::Tokens {
            access_token: pair.access.clone(),
            refresh_token: pair.refresh.clone(),
        });
    }

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::SubscribeNotifications { identity }) => {
                    tracing::debug!(identity = %identity, %connection_id, "resubscribe");
                    state.registry.resubscribe(&identity, connection_id, tx.clone());
                }
                Err(_) => {
                    tracing::debug!(%connection_id, "ignoring unrecognized realtime frame");
                }
            },
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol.
            _ => {}
        }
    }

    state.registry.disconnect(connection_id);
    writer.abort();
    tracing::debug!(identity = %identity, %connection_id, "realtime connection closed");
}
