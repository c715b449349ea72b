//! Parley API Library
//!
//! Real-time customer support chat: conversation rooms, staff dashboard
//! fanout and automated responses, served over WebSocket and REST.

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
