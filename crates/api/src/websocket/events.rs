//! WebSocket event types and serialization
//!
//! Inbound frames are decoded into one closed enum per connection kind;
//! outbound frames are a single enum shared by both kinds.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use parley_shared::{SenderType, SessionId, SessionStatus};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Frames sent by a customer's chat widget
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomerEvent {
    /// Post a message into the customer's own conversation
    ChatMessage {
        message: String,
        sender_type: SenderType,
        sender_name: Option<String>,
        attachment_path: Option<String>,
    },

    /// Close the conversation from the widget
    CloseConversation { sender_name: Option<String> },

    /// Heartbeat ping to keep connection alive
    Ping,
}

/// Frames sent by a staff member's dashboard
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminEvent {
    /// Reply into a specific customer's conversation
    AdminMessage {
        customer_id: String,
        message: String,
        sender_name: Option<String>,
        attachment_path: Option<String>,
    },

    AdminCloseConversation { customer_id: String },

    AdminReopenConversation { customer_id: String },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Message delivered into a conversation room
    ChatMessage(MessagePayload),

    /// Admin-room mirror of a customer or automated message
    NewMessageNotification {
        #[serde(flatten)]
        session: SessionRef,
        #[serde(flatten)]
        message: MessagePayload,
    },

    /// Admin-room confirmation of a staff reply
    AdminMessageSent {
        #[serde(flatten)]
        session: SessionRef,
        #[serde(flatten)]
        message: MessagePayload,
    },

    ConversationClosed {
        closed_by: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },

    ConversationReopened {
        reopened_by: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },

    /// Admin-room notice of a close or reopen
    ConversationStatusChanged {
        #[serde(flatten)]
        session: SessionRef,
        status: SessionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        closed_by: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reopened_by: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { code: String, message: String },

    /// Connection acknowledged
    Connected { connection_id: Uuid },
}

impl ServerEvent {
    /// Wire discriminator, used for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatMessage(_) => "chat_message",
            Self::NewMessageNotification { .. } => "new_message_notification",
            Self::AdminMessageSent { .. } => "admin_message_sent",
            Self::ConversationClosed { .. } => "conversation_closed",
            Self::ConversationReopened { .. } => "conversation_reopened",
            Self::ConversationStatusChanged { .. } => "conversation_status_changed",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
            Self::Connected { .. } => "connected",
        }
    }
}

// =============================================================================
// Event Data Structures
// =============================================================================

/// Message event data
#[derive(Debug, Serialize, Clone)]
pub struct MessagePayload {
    pub message_id: Uuid,
    pub message: String,
    pub sender_type: SenderType,
    pub sender_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
}

/// Conversation a dashboard event refers to
#[derive(Debug, Serialize, Clone)]
pub struct SessionRef {
    pub chat_session_id: SessionId,
    pub customer_id: String,
}
