//! WebSocket connection management
//!
//! Represents one live client connection and its bounded outbound queue.

use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use parley_shared::{ChatError, ChatResult};

use super::events::ServerEvent;

/// Who is on the other end of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    /// A customer's browser, identified by its stable client id
    Customer { customer_id: String },
    /// An authenticated staff member
    Staff { user_id: Uuid, name: String },
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer { customer_id } => write!(f, "customer:{customer_id}"),
            Self::Staff { user_id, .. } => write!(f, "staff:{user_id}"),
        }
    }
}

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique ID for this connection
    pub id: Uuid,

    pub peer: Peer,

    /// Outbound queue drained by the connection's writer task
    sender: mpsc::Sender<ServerEvent>,
}

impl Connection {
    /// Create a new connection
    pub fn new(peer: Peer, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            sender,
        }
    }

    /// Create a connection together with the receiving end of its queue
    pub fn with_capacity(peer: Peer, capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(peer, tx), rx)
    }

    /// Queue an event without waiting.
    ///
    /// Fails when the writer is gone or the queue is full; a member that
    /// cannot keep up is treated the same as a closed one.
    pub fn send(&self, event: ServerEvent) -> ChatResult<()> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => {
                ChatError::DeliveryFailure(format!("outbound queue full for {}", self.id))
            }
            TrySendError::Closed(_) => {
                ChatError::DeliveryFailure(format!("connection {} closed", self.id))
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> Peer {
        Peer::Customer {
            customer_id: "c1".into(),
        }
    }

    #[tokio::test]
    async fn test_send_queues_event() {
        let (conn, mut rx) = Connection::with_capacity(customer(), 4);
        conn.send(ServerEvent::Pong).unwrap();
        assert!(matches!(rx.recv().await, Some(ServerEvent::Pong)));
    }

    #[test]
    fn test_send_fails_when_queue_full() {
        let (conn, _rx) = Connection::with_capacity(customer(), 1);
        conn.send(ServerEvent::Pong).unwrap();
        let err = conn.send(ServerEvent::Pong).unwrap_err();
        assert!(matches!(err, ChatError::DeliveryFailure(_)));
    }

    #[test]
    fn test_send_fails_after_receiver_dropped() {
        let (conn, rx) = Connection::with_capacity(customer(), 4);
        drop(rx);
        assert!(conn.is_closed());
        assert!(conn.send(ServerEvent::Pong).is_err());
    }

    #[test]
    fn test_peer_display() {
        assert_eq!(customer().to_string(), "customer:c1");
    }
}
