//! WebSocket handler for Axum
//!
//! Upgrades customer and staff connections, decodes their frames and
//! drives the conversation controller.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use parley_shared::{ChatError, ChatResult, SenderType};

use crate::auth::{authenticate_staff, StaffUser};
use crate::chat::controller::validate_customer_id;
use crate::chat::{PostMessage, SessionPolicy};
use crate::error::ApiError;
use crate::state::AppState;

use super::{
    connection::{Connection, Peer},
    events::{AdminEvent, CustomerEvent, ServerEvent},
    room::Room,
};

/// Closing actor when the widget does not name one
const DEFAULT_CLOSED_BY: &str = "Customer";

#[derive(Debug, Deserialize)]
pub struct AdminSocketQuery {
    token: String,
}

/// Upgrade a customer's chat widget connection
pub async fn customer_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    validate_customer_id(&customer_id)?;

    tracing::info!(customer_id = %customer_id, "Customer WebSocket upgrade requested");

    Ok(ws.on_upgrade(move |socket| async move {
        let (gateway, rx) = CustomerGateway::connect(state, customer_id).await;
        serve_socket(socket, gateway, rx).await;
    }))
}

/// Upgrade a staff dashboard connection.
///
/// Authenticates via query parameter token; browsers cannot set headers on
/// WebSocket requests.
pub async fn admin_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<AdminSocketQuery>,
) -> Result<Response, ApiError> {
    let staff = authenticate_staff(&state.jwt, &params.token)?;

    tracing::info!(user_id = %staff.user_id, "Admin WebSocket upgrade requested");

    Ok(ws.on_upgrade(move |socket| async move {
        let (gateway, rx) = AdminGateway::connect(state, staff).await;
        serve_socket(socket, gateway, rx).await;
    }))
}

// =============================================================================
// Frame handling
// =============================================================================

/// Per-connection protocol logic, independent of the socket itself
#[async_trait]
pub trait FrameHandler: Send + Sync {
    fn connection(&self) -> &Arc<Connection>;

    /// Handle one inbound text frame. Failures are reported back to the
    /// client as an `error` frame; the connection stays up.
    async fn handle_frame(&self, text: &str);

    /// Release everything the connection holds
    async fn disconnect(&self);

    fn reply_error(&self, err: &ChatError) {
        let _ = self.connection().send(ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }
}

fn decode<T: serde::de::DeserializeOwned>(conn: &Connection, text: &str) -> ChatResult<T> {
    serde_json::from_str(text).map_err(|e| {
        tracing::warn!(
            connection_id = %conn.id,
            error = %e,
            "Failed to parse client event"
        );
        ChatError::Validation(format!("Invalid event format: {e}"))
    })
}

/// Customer side of a conversation
pub struct CustomerGateway {
    state: AppState,
    conn: Arc<Connection>,
    customer_id: String,
}

impl CustomerGateway {
    /// Register the connection and join the conversation room
    pub async fn connect(state: AppState, customer_id: String) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (conn, rx) = state
            .ws_state
            .add_connection(Peer::Customer {
                customer_id: customer_id.clone(),
            })
            .await;

        state.ws_state.rooms.join(Room::customer(&customer_id), Arc::clone(&conn)).await;
        let _ = conn.send(ServerEvent::Connected { connection_id: conn.id });

        (
            Self {
                state,
                conn,
                customer_id,
            },
            rx,
        )
    }

    async fn handle_event(&self, event: CustomerEvent) -> ChatResult<()> {
        match event {
            CustomerEvent::ChatMessage {
                message,
                sender_type,
                sender_name,
                attachment_path,
            } => {
                if sender_type != SenderType::Customer {
                    return Err(ChatError::Validation(
                        "customer connections may only send customer messages".into(),
                    ));
                }

                let posted = self
                    .state
                    .controller
                    .post_message(
                        PostMessage::new(&self.customer_id, message, sender_type)
                            .sender_name(sender_name)
                            .attachment(attachment_path),
                        SessionPolicy::CreateIfMissing,
                    )
                    .await?;

                self.state.scheduler.schedule(posted.session, posted.message);
            }

            CustomerEvent::CloseConversation { sender_name } => {
                let closed_by = sender_name.unwrap_or_else(|| DEFAULT_CLOSED_BY.to_string());
                self.state.close_conversation(&self.customer_id, &closed_by).await?;
            }

            CustomerEvent::Ping => {
                let _ = self.conn.send(ServerEvent::Pong);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FrameHandler for CustomerGateway {
    fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    async fn handle_frame(&self, text: &str) {
        let result = match decode::<CustomerEvent>(&self.conn, text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::debug!(customer_id = %self.customer_id, error = %e, "Customer frame rejected");
            self.reply_error(&e);
        }
    }

    async fn disconnect(&self) {
        self.state.ws_state.remove_connection(&self.conn.id).await;
    }
}

/// Staff dashboard connection
pub struct AdminGateway {
    state: AppState,
    conn: Arc<Connection>,
    staff: StaffUser,
}

impl AdminGateway {
    /// Register the connection and join the dashboard room
    pub async fn connect(state: AppState, staff: StaffUser) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (conn, rx) = state
            .ws_state
            .add_connection(Peer::Staff {
                user_id: staff.user_id,
                name: staff.display_name().to_string(),
            })
            .await;

        state.ws_state.rooms.join(Room::AdminDashboard, Arc::clone(&conn)).await;
        let _ = conn.send(ServerEvent::Connected { connection_id: conn.id });

        (Self { state, conn, staff }, rx)
    }

    async fn handle_event(&self, event: AdminEvent) -> ChatResult<()> {
        match event {
            AdminEvent::AdminMessage {
                customer_id,
                message,
                sender_name,
                attachment_path,
            } => {
                let sender_name = sender_name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| self.staff.display_name().to_string());

                self.state
                    .controller
                    .post_message(
                        PostMessage::new(customer_id, message, SenderType::Admin)
                            .sender_name(Some(sender_name))
                            .attachment(attachment_path),
                        SessionPolicy::MustExist,
                    )
                    .await?;
            }

            AdminEvent::AdminCloseConversation { customer_id } => {
                self.state
                    .close_conversation(&customer_id, self.staff.display_name())
                    .await?;
            }

            AdminEvent::AdminReopenConversation { customer_id } => {
                self.state
                    .controller
                    .reopen_conversation(&customer_id, self.staff.display_name())
                    .await?;
            }

            AdminEvent::Ping => {
                let _ = self.conn.send(ServerEvent::Pong);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FrameHandler for AdminGateway {
    fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    async fn handle_frame(&self, text: &str) {
        let result = match decode::<AdminEvent>(&self.conn, text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::debug!(user_id = %self.staff.user_id, error = %e, "Admin frame rejected");
            self.reply_error(&e);
        }
    }

    async fn disconnect(&self) {
        self.state.ws_state.remove_connection(&self.conn.id).await;
    }
}

// =============================================================================
// Socket loop
// =============================================================================

/// Pump frames between the socket and a handler until either side closes
async fn serve_socket<H: FrameHandler>(socket: WebSocket, handler: H, mut rx: mpsc::Receiver<ServerEvent>) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = handler.connection().id;

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => handler.handle_frame(&text).await,
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket close frame received");
                break;
            }
            // Axum answers pings itself; binary frames are not part of the protocol
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    tracing::info!(connection_id = %connection_id, "WebSocket connection closing");
    handler.disconnect().await;
    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use parley_shared::SessionStatus;
    use uuid::Uuid;

    fn app_state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        AppState::new(Config::default(), store.clone(), store)
    }

    fn staff() -> StaffUser {
        StaffUser {
            user_id: Uuid::new_v4(),
            name: "Grace".into(),
            email: "grace@example.com".into(),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_customer_connect_acknowledges_and_joins_room() {
        let state = app_state();
        let (gateway, mut rx) = CustomerGateway::connect(state.clone(), "c1".into()).await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::Connected { connection_id } if connection_id == gateway.conn.id
        ));
        assert_eq!(state.ws_state.rooms.room_size(&Room::customer("c1")).await, 1);

        gateway.disconnect().await;
        assert_eq!(state.ws_state.rooms.room_size(&Room::customer("c1")).await, 0);
    }

    #[tokio::test]
    async fn test_ping_gets_pong() {
        let (gateway, mut rx) = CustomerGateway::connect(app_state(), "c1".into()).await;
        drain(&mut rx);

        gateway.handle_frame(r#"{"type":"ping"}"#).await;
        assert!(matches!(rx.try_recv().unwrap(), ServerEvent::Pong));
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_error_and_connection_survives() {
        let (gateway, mut rx) = CustomerGateway::connect(app_state(), "c1".into()).await;
        drain(&mut rx);

        gateway.handle_frame("{not json").await;
        gateway.handle_frame(r#"{"type":"teleport"}"#).await;
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, ServerEvent::Error { code, .. } if code == "VALIDATION_ERROR")));

        gateway.handle_frame(r#"{"type":"ping"}"#).await;
        assert!(matches!(rx.try_recv().unwrap(), ServerEvent::Pong));
    }

    #[tokio::test]
    async fn test_customer_message_is_echoed_into_room() {
        let state = app_state();
        let (gateway, mut rx) = CustomerGateway::connect(state.clone(), "c1".into()).await;
        drain(&mut rx);

        gateway
            .handle_frame(r#"{"type":"chat_message","message":"need help","sender_type":"customer","sender_name":"Ada"}"#)
            .await;

        match rx.try_recv().unwrap() {
            ServerEvent::ChatMessage(payload) => {
                assert_eq!(payload.message, "need help");
                assert_eq!(payload.sender_name, "Ada");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(state.controller.sessions().find_session("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_customer_cannot_impersonate_staff() {
        let (gateway, mut rx) = CustomerGateway::connect(app_state(), "c1".into()).await;
        drain(&mut rx);

        gateway
            .handle_frame(r#"{"type":"chat_message","message":"hi","sender_type":"admin"}"#)
            .await;
        assert!(matches!(rx.try_recv().unwrap(), ServerEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_admin_message_to_unknown_customer_reports_error() {
        let state = app_state();
        let (admin, mut admin_rx) = AdminGateway::connect(state.clone(), staff()).await;
        drain(&mut admin_rx);

        admin
            .handle_frame(r#"{"type":"admin_message","customer_id":"ghost","message":"hello?"}"#)
            .await;

        match admin_rx.try_recv().unwrap() {
            ServerEvent::Error { code, .. } => assert_eq!(code, "SESSION_NOT_FOUND"),
            other => panic!("unexpected event {other:?}"),
        }
        // Still connected
        assert_eq!(state.ws_state.rooms.room_size(&Room::AdminDashboard).await, 1);
    }

    #[tokio::test]
    async fn test_admin_reply_and_close_reach_customer() {
        let state = app_state();
        let (customer, mut customer_rx) = CustomerGateway::connect(state.clone(), "c1".into()).await;
        let (admin, mut admin_rx) = AdminGateway::connect(state.clone(), staff()).await;

        customer
            .handle_frame(r#"{"type":"chat_message","message":"where is my order","sender_type":"customer"}"#)
            .await;
        drain(&mut customer_rx);
        drain(&mut admin_rx);

        admin
            .handle_frame(r#"{"type":"admin_message","customer_id":"c1","message":"checking now"}"#)
            .await;
        match customer_rx.try_recv().unwrap() {
            ServerEvent::ChatMessage(payload) => {
                assert_eq!(payload.sender_type, SenderType::Admin);
                assert_eq!(payload.sender_name, "Grace");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(admin_rx.try_recv().unwrap(), ServerEvent::AdminMessageSent { .. }));

        admin
            .handle_frame(r#"{"type":"admin_close_conversation","customer_id":"c1"}"#)
            .await;
        assert!(matches!(
            customer_rx.try_recv().unwrap(),
            ServerEvent::ConversationClosed { closed_by, .. } if closed_by == "Grace"
        ));
        assert!(matches!(
            admin_rx.try_recv().unwrap(),
            ServerEvent::ConversationStatusChanged { status: SessionStatus::Closed, .. }
        ));

        admin
            .handle_frame(r#"{"type":"admin_reopen_conversation","customer_id":"c1"}"#)
            .await;
        assert!(matches!(
            customer_rx.try_recv().unwrap(),
            ServerEvent::ConversationReopened { reopened_by, .. } if reopened_by == "Grace"
        ));
    }

    #[tokio::test]
    async fn test_customer_close_defaults_actor() {
        let state = app_state();
        let (customer, mut rx) = CustomerGateway::connect(state.clone(), "c1".into()).await;
        customer
            .handle_frame(r#"{"type":"chat_message","message":"bye","sender_type":"customer"}"#)
            .await;
        drain(&mut rx);

        customer.handle_frame(r#"{"type":"close_conversation"}"#).await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::ConversationClosed { closed_by, .. } if closed_by == "Customer"
        ));
    }
}
