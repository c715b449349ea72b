//! Staff availability for the `offline` trigger

use std::sync::Arc;

use async_trait::async_trait;
use parley_shared::ChatResult;

use crate::websocket::{Room, RoomBroker};

/// Answers whether any staff member can pick up a conversation right now
#[async_trait]
pub trait StaffPresence: Send + Sync {
    async fn any_staff_available(&self) -> ChatResult<bool>;
}

/// Staff count as available while at least one dashboard is connected
pub struct DashboardPresence {
    rooms: Arc<RoomBroker>,
}

impl DashboardPresence {
    pub fn new(rooms: Arc<RoomBroker>) -> Self {
        Self { rooms }
    }
}

#[async_trait]
impl StaffPresence for DashboardPresence {
    async fn any_staff_available(&self) -> ChatResult<bool> {
        Ok(self.rooms.room_size(&Room::AdminDashboard).await > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::{Connection, Peer};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_presence_follows_dashboard_room() {
        let rooms = Arc::new(RoomBroker::new());
        let presence = DashboardPresence::new(Arc::clone(&rooms));
        assert!(!presence.any_staff_available().await.unwrap());

        let (conn, _rx) = Connection::with_capacity(
            Peer::Staff {
                user_id: Uuid::new_v4(),
                name: "Grace".into(),
            },
            4,
        );
        let conn = Arc::new(conn);
        rooms.join(Room::AdminDashboard, Arc::clone(&conn)).await;
        assert!(presence.any_staff_available().await.unwrap());

        rooms.remove_connection(&conn.id).await;
        assert!(!presence.any_staff_available().await.unwrap());
    }
}
