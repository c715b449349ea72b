//! Global WebSocket state management
//!
//! Tracks every live connection next to the room broker that routes
//! events between them.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::connection::{Connection, Peer};
use super::events::ServerEvent;
use super::room::{BrokerStats, RoomBroker};

/// Global WebSocket state shared across all connections
#[derive(Clone)]
pub struct WebSocketState {
    /// All active connections indexed by connection id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,

    pub rooms: Arc<RoomBroker>,

    /// Outbound queue capacity for new connections
    outbound_buffer: usize,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomBroker::new()),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Register a new connection and hand back its outbound queue
    pub async fn add_connection(&self, peer: Peer) -> (Arc<Connection>, mpsc::Receiver<ServerEvent>) {
        let (conn, rx) = Connection::with_capacity(peer, self.outbound_buffer);
        let conn = Arc::new(conn);

        let mut connections = self.connections.write().await;
        connections.insert(conn.id, Arc::clone(&conn));

        tracing::info!(
            connection_id = %conn.id,
            peer = %conn.peer,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        (conn, rx)
    }

    /// Remove a connection and its room memberships
    pub async fn remove_connection(&self, connection_id: &Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.remove(connection_id) {
            self.rooms.remove_connection(connection_id).await;

            tracing::info!(
                connection_id = %connection_id,
                peer = %conn.peer,
                remaining_connections = connections.len(),
                "WebSocket connection removed"
            );
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn stats(&self) -> WebSocketStats {
        WebSocketStats {
            connections: self.connection_count().await,
            rooms: self.rooms.stats().await,
        }
    }
}

/// Snapshot reported by the health endpoint
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct WebSocketStats {
    pub connections: usize,
    #[serde(flatten)]
    pub rooms: BrokerStats,
}
