use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use inksketch_core::types::{Timestamp, UserId};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single registered WebSocket connection.
pub struct WsConnection {
    /// The authenticated user that owns this connection. Established at
    /// connect time; a connection belongs to exactly one user.
    pub user_id: UserId,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// User-keyed registry of live WebSocket connections.
///
/// The single source of truth for the connection-to-user mapping: a user
/// may hold many connections (tabs, devices), each registered under
/// exactly one user. Thread-safe via interior `RwLock`; designed to be
/// wrapped in `Arc` and shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection under its owning user.
    ///
    /// Idempotent per handle: registering the same `conn_id` twice simply
    /// replaces the previous entry.
    pub async fn connect(&self, conn_id: String, user_id: UserId, sender: WsSender) {
        let conn = WsConnection {
            user_id: user_id.clone(),
            sender,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        tracing::info!(user_id = %user_id, "WebSocket connection registered");
    }

    /// Remove a connection from the registry.
    ///
    /// Safe to call for an already-removed handle (no-op).
    pub async fn disconnect(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            tracing::info!(user_id = %conn.user_id, "WebSocket connection removed");
        }
    }

    /// Deliver a message to every live connection of `user_id`.
    ///
    /// Connections whose send fails are treated as dead and removed as
    /// part of this call -- the caller never needs a separate cleanup
    /// pass. Returns the number of connections delivered to.
    pub async fn send_to_user(&self, user_id: &str, message: Message) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let conns = self.connections.read().await;
            for (conn_id, conn) in conns.iter() {
                if conn.user_id != user_id {
                    continue;
                }
                if conn.sender.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(conn_id.clone());
                }
            }
        }
        for conn_id in dead {
            self.disconnect(&conn_id).await;
        }
        delivered
    }

    /// Deliver a message to every currently-registered connection.
    ///
    /// Dead connections are pruned, same as [`send_to_user`](Self::send_to_user).
    pub async fn broadcast(&self, message: Message) {
        let mut dead = Vec::new();
        {
            let conns = self.connections.read().await;
            for (conn_id, conn) in conns.iter() {
                if conn.sender.send(message.clone()).is_err() {
                    dead.push(conn_id.clone());
                }
            }
        }
        for conn_id in dead {
            self.disconnect(&conn_id).await;
        }
    }

    /// Return the current number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Return how many connections a user currently holds.
    pub async fn user_connection_count(&self, user_id: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.user_id == user_id)
            .count()
    }

    /// Send a Ping frame to every registered connection.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear the registry.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
