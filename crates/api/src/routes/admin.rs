//! Support dashboard routes (staff only)

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_shared::{ConversationSession, SessionId, SessionStatus, SessionSummary};

use crate::{
    auth::StaffUser,
    error::ApiResult,
    routes::chat::MessageResponse,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    pub chat_session: ConversationSession,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: SessionStatus,
}

/// Conversations by most recent activity, optionally filtered by status
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<SessionStatus>)
        .transpose()?;

    Ok(Json(state.controller.list_sessions(status).await?))
}

/// Open a conversation: returns the transcript and marks customer messages read
pub async fn session_detail(
    State(state): State<AppState>,
    Extension(staff): Extension<StaffUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionDetailResponse>> {
    let (chat_session, messages) = state.controller.session_detail(SessionId(session_id)).await?;

    tracing::debug!(
        session_id = %session_id,
        user_id = %staff.user_id,
        "Conversation opened on dashboard"
    );

    Ok(Json(SessionDetailResponse {
        chat_session,
        messages: messages
            .into_iter()
            .map(|m| MessageResponse::from_message(&state.controller, m))
            .collect(),
    }))
}

/// Close or reopen a conversation
pub async fn update_status(
    State(state): State<AppState>,
    Extension(staff): Extension<StaffUser>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<ConversationSession>> {
    let session = state
        .controller
        .session_by_id(SessionId(session_id))
        .await?;

    let updated = match req.status {
        SessionStatus::Closed => {
            state
                .close_conversation(&session.customer_id, staff.display_name())
                .await?
        }
        SessionStatus::Open => {
            state
                .controller
                .reopen_conversation(&session.customer_id, staff.display_name())
                .await?
        }
    };

    Ok(Json(updated))
}
