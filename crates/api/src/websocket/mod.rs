//! WebSocket support for live chat
//!
//! # Architecture
//!
//! - **Connection**: one live client with a bounded outbound queue
//! - **Room**: per-conversation and dashboard pub/sub groups
//! - **State**: global WebSocket state shared across all connections
//! - **Handler**: Axum upgrade handlers and per-connection frame handling
//! - **Events**: type-safe frames for client/server communication

pub mod connection;
pub mod events;
pub mod handler;
pub mod room;
pub mod state;

pub use connection::{Connection, Peer};
pub use events::{AdminEvent, CustomerEvent, MessagePayload, ServerEvent, SessionRef};
pub use handler::{admin_ws_handler, customer_ws_handler, AdminGateway, CustomerGateway, FrameHandler};
pub use room::{BrokerStats, Delivery, Room, RoomBroker, ADMIN_DASHBOARD_ROOM};
pub use state::{WebSocketState, WebSocketStats};
