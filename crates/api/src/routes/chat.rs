//! Customer chat routes
//!
//! Used by the chat widget to start a conversation, load its history and
//! send messages when the socket is unavailable.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use parley_shared::{ConversationSession, CustomerProfile, Message, MessageId, SenderType};

use crate::{
    chat::{ConversationController, PostMessage, SessionPolicy},
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartChatRequest {
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartChatResponse {
    pub chat_session: ConversationSession,
    pub customer_id: String,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub customer_id: String,
    pub message: String,
    #[serde(default = "default_sender_type")]
    pub sender_type: SenderType,
    pub sender_name: Option<String>,
}

fn default_sender_type() -> SenderType {
    SenderType::Customer
}

/// Message as returned by the REST endpoints
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: MessageId,
    pub content: String,
    pub sender_type: SenderType,
    pub sender_name: Option<String>,
    pub attachment_url: Option<String>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl MessageResponse {
    pub fn from_message(controller: &ConversationController, message: Message) -> Self {
        Self {
            attachment_url: message.attachment.as_deref().map(|p| controller.attachment_url(p)),
            id: message.id,
            content: message.content,
            sender_type: message.sender_type,
            sender_name: message.sender_name,
            is_read: message.is_read,
            timestamp: message.created_at,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Start or resume a conversation. A customer id is generated when the
/// widget does not have one yet.
pub async fn start_chat(
    State(state): State<AppState>,
    Json(req): Json<StartChatRequest>,
) -> ApiResult<(StatusCode, Json<StartChatResponse>)> {
    let customer_id = req
        .customer_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (chat_session, created) = state
        .controller
        .start_or_resume_session(
            &customer_id,
            CustomerProfile::new(req.customer_name, req.customer_email),
        )
        .await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((
        status,
        Json(StartChatResponse {
            chat_session,
            customer_id,
            created,
        }),
    ))
}

/// Transcript of a conversation, oldest first
pub async fn chat_history(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let messages = state.controller.history(&customer_id).await?;

    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageResponse::from_message(&state.controller, m))
            .collect(),
    ))
}

/// Send a customer message without a socket. Goes through the same
/// persist, fanout and automated response path.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    if req.sender_type != SenderType::Customer {
        return Err(ApiError::Validation(
            "only customer messages can be sent here".to_string(),
        ));
    }

    let posted = state
        .controller
        .post_message(
            PostMessage::new(req.customer_id, req.message, SenderType::Customer).sender_name(req.sender_name),
            SessionPolicy::MustExist,
        )
        .await?;

    tracing::info!(
        customer_id = %posted.session.customer_id,
        message_id = %posted.message.id,
        "Message sent via REST fallback"
    );

    let response = MessageResponse::from_message(&state.controller, posted.message.clone());
    state.scheduler.schedule(posted.session, posted.message);

    Ok((StatusCode::CREATED, Json(response)))
}
