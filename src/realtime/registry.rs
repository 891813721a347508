// SPDX-License-Identifier: AGPL-3.0-or-later

//! Live connection registry: identity → most recent socket.
//!
//! Process-local and volatile; rebuilt from zero on restart. Only the most
//! recent socket per identity receives pushes — concurrent connects for the
//! same identity are last-write-wins on the map entry. The registry is
//! mutated exclusively through `connect`, `disconnect` and `resubscribe`.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Frames the server pushes to a connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Rotated token pair. There is no response object for an established
    /// connection, so rotation results ride a dedicated control frame.
    #[serde(rename_all = "snake_case")]
    Tokens {
        access_token: String,
        refresh_token: String,
    },
    /// Application payload for the identity's live socket.
    Notification(serde_json::Value),
}

/// Volatile mapping entry: which connection currently owns an identity.
struct LiveConnection {
    connection_id: Uuid,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Owned, explicitly-locked registry of live connections.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, LiveConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Associate `identity` with a new connection; returns its id.
    ///
    /// An existing association for the identity is replaced: the previous
    /// socket stops receiving pushes.
    pub fn connect(&self, identity: &str, sender: mpsc::UnboundedSender<ServerEvent>) -> Uuid {
        let connection_id = Uuid::new_v4();
        if let Ok(mut connections) = self.connections.lock() {
            connections.insert(
                identity.to_string(),
                LiveConnection {
                    connection_id,
                    sender,
                },
            );
        }
        connection_id
    }

    /// Re-associate `identity` with an already-established connection.
    ///
    /// This honors a client `subscribeNotifications` control message and
    /// deliberately does not re-run authentication — a known trust gap of
    /// the protocol, confined to this single entry point.
    pub fn resubscribe(
        &self,
        identity: &str,
        connection_id: Uuid,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        if let Ok(mut connections) = self.connections.lock() {
            connections.insert(
                identity.to_string(),
                LiveConnection {
                    connection_id,
                    sender,
                },
            );
        }
    }

    /// Remove every identity association still owned by `connection_id`.
    ///
    /// Idempotent; associations already taken over by a newer connection
    /// are left alone.
    pub fn disconnect(&self, connection_id: Uuid) {
        if let Ok(mut connections) = self.connections.lock() {
            connections.retain(|_, live| live.connection_id != connection_id);
        }
    }

    /// Push a notification payload to `identity`'s live socket.
    ///
    /// Returns `false` if the identity has no live connection. A dead
    /// sender is pruned on the spot.
    pub fn send_notification(&self, identity: &str, payload: serde_json::Value) -> bool {
        let Ok(mut connections) = self.connections.lock() else {
            return false;
        };
        match connections.get(identity) {
            Some(live) => {
                if live.sender.send(ServerEvent::Notification(payload)).is_ok() {
                    true
                } else {
                    connections.remove(identity);
                    false
                }
            }
            None => false,
        }
    }

    /// Number of identities with a live connection.
    pub fn connected_count(&self) -> usize {
        self.connections.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
