//! Conversation room management for pub/sub
//!
//! Every customer conversation has its own room; all staff dashboards share
//! a single admin room.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;

/// Name of the room every staff dashboard joins
pub const ADMIN_DASHBOARD_ROOM: &str = "admin_dashboard";

/// A named broadcast group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// Room for one customer's conversation, keyed by customer id
    Customer(String),
    AdminDashboard,
}

impl Room {
    pub fn customer(customer_id: impl Into<String>) -> Self {
        Self::Customer(customer_id.into())
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer(customer_id) => write!(f, "chat_{customer_id}"),
            Self::AdminDashboard => f.write_str(ADMIN_DASHBOARD_ROOM),
        }
    }
}

/// Outcome of a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Members that could not take the event and were evicted
    pub evicted: usize,
}

/// Point-in-time broker counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BrokerStats {
    pub active_rooms: usize,
    pub total_memberships: usize,
    pub admin_connections: usize,
}

/// Routes events to the live connections of a room
pub struct RoomBroker {
    /// Map of room -> member connections
    rooms: RwLock<HashMap<Room, Vec<Arc<Connection>>>>,
}

impl RoomBroker {
    /// Create a new broker
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection to a room. Joining twice is a no-op.
    pub async fn join(&self, room: Room, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.clone()).or_default();
        if members.iter().any(|c| c.id == conn.id) {
            return;
        }
        members.push(Arc::clone(&conn));

        tracing::debug!(
            room = %room,
            connection_id = %conn.id,
            peer = %conn.peer,
            room_size = members.len(),
            "Connection joined room"
        );
    }

    /// Remove a connection from a room
    pub async fn leave(&self, room: &Room, connection_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(conns) = rooms.get_mut(room) {
            conns.retain(|c| c.id != *connection_id);

            if conns.is_empty() {
                rooms.remove(room);
                tracing::debug!(room = %room, "Removed empty room");
            } else {
                tracing::debug!(
                    room = %room,
                    connection_id = %connection_id,
                    room_size = conns.len(),
                    "Connection left room"
                );
            }
        }
    }

    /// Deliver an event to every current member of a room.
    ///
    /// Never waits on a slow member: anyone whose queue is full or closed
    /// is dropped from the room. Publishing to an empty room does nothing.
    pub async fn publish(&self, room: &Room, event: ServerEvent) -> Delivery {
        let mut delivery = Delivery::default();
        let mut failed = Vec::new();

        {
            let rooms = self.rooms.read().await;
            let Some(conns) = rooms.get(room) else {
                tracing::trace!(room = %room, event_type = event.kind(), "No members in room");
                return delivery;
            };

            for conn in conns {
                match conn.send(event.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(e) => {
                        tracing::warn!(
                            room = %room,
                            connection_id = %conn.id,
                            error = %e,
                            "Dropping room member that could not take event"
                        );
                        failed.push(conn.id);
                    }
                }
            }
        }

        if !failed.is_empty() {
            let mut rooms = self.rooms.write().await;
            if let Some(conns) = rooms.get_mut(room) {
                let before = conns.len();
                conns.retain(|c| !failed.contains(&c.id));
                delivery.evicted = before - conns.len();
                if conns.is_empty() {
                    rooms.remove(room);
                }
            }
        }

        tracing::debug!(
            room = %room,
            event_type = event.kind(),
            recipients = delivery.delivered,
            evicted = delivery.evicted,
            "Published event to room"
        );

        delivery
    }

    /// Remove a connection from all rooms
    pub async fn remove_connection(&self, connection_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0usize;

        for conns in rooms.values_mut() {
            let before_len = conns.len();
            conns.retain(|c| c.id != *connection_id);
            if conns.len() < before_len {
                removed_from += 1;
            }
        }

        rooms.retain(|_, conns| !conns.is_empty());

        if removed_from > 0 {
            tracing::debug!(
                connection_id = %connection_id,
                room_count = removed_from,
                "Removed connection from rooms"
            );
        }
    }

    /// Number of connections in a room
    pub async fn room_size(&self, room: &Room) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(|v| v.len()).unwrap_or(0)
    }

    /// Total number of rooms with at least one member
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn stats(&self) -> BrokerStats {
        let rooms = self.rooms.read().await;
        BrokerStats {
            active_rooms: rooms.len(),
            total_memberships: rooms.values().map(Vec::len).sum(),
            admin_connections: rooms.get(&Room::AdminDashboard).map(Vec::len).unwrap_or(0),
        }
    }
}

impl Default for RoomBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Peer;
    use tokio::sync::mpsc;

    fn connection(capacity: usize) -> (Arc<Connection>, mpsc::Receiver<ServerEvent>) {
        let (conn, rx) = Connection::with_capacity(
            Peer::Customer {
                customer_id: "c1".into(),
            },
            capacity,
        );
        (Arc::new(conn), rx)
    }

    #[test]
    fn test_room_names() {
        assert_eq!(Room::customer("abc").name(), "chat_abc");
        assert_eq!(Room::AdminDashboard.name(), "admin_dashboard");
    }

    #[tokio::test]
    async fn test_room_join_and_leave() {
        let broker = RoomBroker::new();
        let room = Room::customer("c1");
        let (conn, _rx) = connection(8);

        assert_eq!(broker.room_size(&room).await, 0);

        broker.join(room.clone(), Arc::clone(&conn)).await;
        broker.join(room.clone(), Arc::clone(&conn)).await;
        assert_eq!(broker.room_size(&room).await, 1);

        broker.leave(&room, &conn.id).await;
        assert_eq!(broker.room_size(&room).await, 0);
        assert_eq!(broker.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_member() {
        let broker = RoomBroker::new();
        let room = Room::customer("c1");
        let (conn1, mut rx1) = connection(8);
        let (conn2, mut rx2) = connection(8);

        broker.join(room.clone(), conn1).await;
        broker.join(room.clone(), conn2).await;

        let delivery = broker.publish(&room, ServerEvent::Pong).await;
        assert_eq!(delivery.delivered, 2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_publish_to_empty_room_is_noop() {
        let broker = RoomBroker::new();
        let delivery = broker.publish(&Room::customer("nobody"), ServerEvent::Pong).await;
        assert_eq!(delivery, Delivery::default());
    }

    #[tokio::test]
    async fn test_publish_does_not_cross_rooms() {
        let broker = RoomBroker::new();
        let (conn1, mut rx1) = connection(8);
        let (conn2, mut rx2) = connection(8);
        broker.join(Room::customer("a"), conn1).await;
        broker.join(Room::customer("b"), conn2).await;

        broker.publish(&Room::customer("a"), ServerEvent::Pong).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_member_is_evicted_without_blocking_others() {
        let broker = RoomBroker::new();
        let room = Room::AdminDashboard;
        let (slow, _slow_rx) = connection(1);
        let (gone, gone_rx) = connection(8);
        let (healthy, mut healthy_rx) = connection(8);
        drop(gone_rx);

        broker.join(room.clone(), Arc::clone(&slow)).await;
        broker.join(room.clone(), gone).await;
        broker.join(room.clone(), healthy).await;

        // Fill the slow member's queue
        slow.send(ServerEvent::Pong).unwrap();

        let delivery = broker.publish(&room, ServerEvent::Pong).await;
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.evicted, 2);
        assert_eq!(broker.room_size(&room).await, 1);
        assert!(healthy_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_remove_connection_from_all_rooms() {
        let broker = RoomBroker::new();
        let (conn, _rx) = connection(8);

        broker.join(Room::customer("c1"), Arc::clone(&conn)).await;
        broker.join(Room::AdminDashboard, Arc::clone(&conn)).await;
        assert_eq!(broker.room_count().await, 2);

        broker.remove_connection(&conn.id).await;

        assert_eq!(broker.room_count().await, 0);
        assert_eq!(broker.stats().await.total_memberships, 0);
    }
}
