//! Conversation controller
//!
//! Owns the lifecycle of a conversation: starting or resuming it, posting
//! messages, closing and reopening. Every state change is persisted first
//! and then fanned out to the conversation room and the admin dashboard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use parley_shared::{
    ChatError, ChatResult, ConversationSession, CustomerProfile, Message, NewMessage, SenderType,
    SessionId, SessionStatus, SessionSummary,
};

use crate::store::SessionStore;
use crate::websocket::{MessagePayload, Room, RoomBroker, ServerEvent, SessionRef};

/// Sender name on lifecycle messages
pub const SYSTEM_SENDER: &str = "System";
/// Shown when a customer does not give a name
pub const ANONYMOUS_SENDER: &str = "Anonymous";
/// Shown when a staff reply carries no name
pub const SUPPORT_SENDER: &str = "Support";

/// Longest accepted customer id, in characters (`chat_sessions.customer_id`)
pub const MAX_CUSTOMER_ID_LEN: usize = 50;

/// Lock table entries are pruned once the table grows past this size
const LOCK_TABLE_PRUNE_AT: usize = 1024;

/// What to do when a message targets a conversation that does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Start the conversation implicitly (customer connections)
    CreateIfMissing,
    /// Fail with `SessionNotFound` (staff and API callers)
    MustExist,
}

/// A message to be posted into a conversation
#[derive(Debug, Clone)]
pub struct PostMessage {
    pub customer_id: String,
    pub content: String,
    pub sender_type: SenderType,
    pub sender_name: Option<String>,
    pub attachment: Option<String>,
}

impl PostMessage {
    pub fn new(customer_id: impl Into<String>, content: impl Into<String>, sender_type: SenderType) -> Self {
        Self {
            customer_id: customer_id.into(),
            content: content.into(),
            sender_type,
            sender_name: None,
            attachment: None,
        }
    }

    pub fn sender_name(mut self, name: Option<String>) -> Self {
        self.sender_name = name;
        self
    }

    pub fn attachment(mut self, path: Option<String>) -> Self {
        self.attachment = path;
        self
    }
}

/// A persisted message together with its conversation
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub session: ConversationSession,
    pub message: Message,
}

/// Exclusive hold on one conversation.
///
/// Mutations of a conversation and the fanout that follows them happen while
/// a guard is held, so room members observe them in persistence order.
pub struct SessionGuard {
    customer_id: String,
    _lock: OwnedMutexGuard<()>,
}

impl SessionGuard {
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }
}

#[derive(Default)]
struct SessionLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, customer_id: &str) -> SessionGuard {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if table.len() >= LOCK_TABLE_PRUNE_AT {
                // Only the table holds a reference: nobody owns or awaits it
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(table.entry(customer_id.to_string()).or_default())
        };

        SessionGuard {
            customer_id: customer_id.to_string(),
            _lock: lock.lock_owned().await,
        }
    }
}

/// Coordinates conversation state changes and their fanout
pub struct ConversationController {
    sessions: Arc<dyn SessionStore>,
    rooms: Arc<RoomBroker>,
    locks: SessionLocks,
    media_url: String,
}

impl ConversationController {
    pub fn new(sessions: Arc<dyn SessionStore>, rooms: Arc<RoomBroker>, media_url: impl Into<String>) -> Self {
        Self {
            sessions,
            rooms,
            locks: SessionLocks::default(),
            media_url: media_url.into(),
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn rooms(&self) -> &Arc<RoomBroker> {
        &self.rooms
    }

    /// Public URL of a stored attachment
    pub fn attachment_url(&self, path: &str) -> String {
        format!("{}{}", self.media_url, path.trim_start_matches('/'))
    }

    /// Take the conversation lock for `customer_id`
    pub async fn lock_session(&self, customer_id: &str) -> SessionGuard {
        self.locks.acquire(customer_id).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Return the customer's conversation, creating it on first contact
    pub async fn start_or_resume_session(
        &self,
        customer_id: &str,
        profile: CustomerProfile,
    ) -> ChatResult<(ConversationSession, bool)> {
        validate_customer_id(customer_id)?;

        let _guard = self.lock_session(customer_id).await;
        let (session, created) = self.sessions.get_or_create_session(customer_id, &profile).await?;

        if created {
            tracing::info!(
                customer_id = %customer_id,
                session_id = %session.id,
                "Conversation started"
            );
        }

        Ok((session, created))
    }

    pub async fn close_conversation(&self, customer_id: &str, closed_by: &str) -> ChatResult<ConversationSession> {
        self.transition(customer_id, closed_by, SessionStatus::Closed).await
    }

    pub async fn reopen_conversation(&self, customer_id: &str, reopened_by: &str) -> ChatResult<ConversationSession> {
        self.transition(customer_id, reopened_by, SessionStatus::Open).await
    }

    /// Move a conversation to `status`, record it in the transcript and
    /// notify both audiences.
    ///
    /// Applying the current status again still records and notifies.
    async fn transition(&self, customer_id: &str, actor: &str, status: SessionStatus) -> ChatResult<ConversationSession> {
        let _guard = self.lock_session(customer_id).await;

        let session = self.require_session(customer_id).await?;

        let (verb, actor) = match status {
            SessionStatus::Closed => ("closed", non_blank_or(actor, "Customer")),
            SessionStatus::Open => ("reopened", non_blank_or(actor, SUPPORT_SENDER)),
        };

        let (session, _note) = self
            .sessions
            .transition_status(
                status,
                NewMessage {
                    session_id: session.id,
                    content: format!("Conversation {verb} by {actor}"),
                    sender_type: SenderType::System,
                    sender_name: Some(SYSTEM_SENDER.to_string()),
                    attachment: None,
                },
            )
            .await?;

        let timestamp = session.updated_at;
        let room_event = match status {
            SessionStatus::Closed => ServerEvent::ConversationClosed {
                closed_by: actor.clone(),
                timestamp,
            },
            SessionStatus::Open => ServerEvent::ConversationReopened {
                reopened_by: actor.clone(),
                timestamp,
            },
        };
        let (closed_by, reopened_by) = match status {
            SessionStatus::Closed => (Some(actor.clone()), None),
            SessionStatus::Open => (None, Some(actor.clone())),
        };

        self.rooms.publish(&Room::customer(customer_id), room_event).await;
        self.rooms
            .publish(
                &Room::AdminDashboard,
                ServerEvent::ConversationStatusChanged {
                    session: session_ref(&session),
                    status,
                    closed_by,
                    reopened_by,
                    timestamp,
                },
            )
            .await;

        tracing::info!(
            customer_id = %customer_id,
            session_id = %session.id,
            status = status.as_str(),
            actor = %actor,
            "Conversation {verb}"
        );

        Ok(session)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Persist a message and fan it out
    pub async fn post_message(&self, post: PostMessage, policy: SessionPolicy) -> ChatResult<PostedMessage> {
        validate_customer_id(&post.customer_id)?;
        validate_content(&post)?;

        let guard = self.lock_session(&post.customer_id).await;
        let posted = self.persist_message(&guard, post, policy).await?;
        self.publish_message(&guard, &posted).await;

        Ok(posted)
    }

    /// Persist a message under an already held conversation lock.
    ///
    /// A staff-authored message marks the customer's messages read.
    pub async fn persist_message(
        &self,
        guard: &SessionGuard,
        post: PostMessage,
        policy: SessionPolicy,
    ) -> ChatResult<PostedMessage> {
        debug_assert_eq!(guard.customer_id(), post.customer_id);

        let session = match policy {
            SessionPolicy::CreateIfMissing => {
                self.sessions
                    .get_or_create_session(&post.customer_id, &CustomerProfile::default())
                    .await?
                    .0
            }
            SessionPolicy::MustExist => self.require_session(&post.customer_id).await?,
        };

        let sender_name = post
            .sender_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| Some(default_sender_name(post.sender_type).to_string()));

        let message = self
            .sessions
            .insert_message(NewMessage {
                session_id: session.id,
                content: post.content,
                sender_type: post.sender_type,
                sender_name,
                attachment: post.attachment.filter(|p| !p.trim().is_empty()),
            })
            .await?;

        tracing::debug!(
            session_id = %session.id,
            message_id = %message.id,
            sender_type = message.sender_type.as_str(),
            "Message persisted"
        );

        // The message stands even if read flags cannot be updated
        if message.sender_type == SenderType::Admin {
            match self.sessions.mark_customer_messages_read(session.id).await {
                Ok(0) => {}
                Ok(marked) => tracing::debug!(session_id = %session.id, marked, "Marked customer messages read"),
                Err(e) => tracing::warn!(session_id = %session.id, error = %e, "Failed to mark customer messages read"),
            }
        }

        Ok(PostedMessage { session, message })
    }

    /// Fan a persisted message out to the conversation room and the
    /// admin dashboard
    pub async fn publish_message(&self, guard: &SessionGuard, posted: &PostedMessage) {
        let payload = self.payload(&posted.message);
        let session = session_ref(&posted.session);

        self.rooms
            .publish(&Room::customer(guard.customer_id()), ServerEvent::ChatMessage(payload.clone()))
            .await;

        let admin_event = match posted.message.sender_type {
            SenderType::Admin => ServerEvent::AdminMessageSent {
                session,
                message: payload,
            },
            SenderType::Customer | SenderType::System => ServerEvent::NewMessageNotification {
                session,
                message: payload,
            },
        };
        self.rooms.publish(&Room::AdminDashboard, admin_event).await;
    }

    /// Wire form of a stored message
    pub fn payload(&self, message: &Message) -> MessagePayload {
        MessagePayload {
            message_id: message.id.0,
            message: message.content.clone(),
            sender_type: message.sender_type,
            sender_name: message
                .sender_name
                .clone()
                .unwrap_or_else(|| default_sender_name(message.sender_type).to_string()),
            timestamp: message.created_at,
            attachment_url: message.attachment.as_deref().map(|p| self.attachment_url(p)),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Transcript of a customer's conversation
    pub async fn history(&self, customer_id: &str) -> ChatResult<Vec<Message>> {
        let session = self.require_session(customer_id).await?;
        self.sessions.list_messages(session.id).await
    }

    pub async fn list_sessions(&self, status: Option<SessionStatus>) -> ChatResult<Vec<SessionSummary>> {
        self.sessions.list_sessions(status).await
    }

    pub async fn session_by_id(&self, id: SessionId) -> ChatResult<ConversationSession> {
        self.sessions
            .find_session_by_id(id)
            .await?
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))
    }

    /// Conversation opened by a staff member: marks customer messages read
    /// and returns the full transcript
    pub async fn session_detail(&self, id: SessionId) -> ChatResult<(ConversationSession, Vec<Message>)> {
        let session = self.session_by_id(id).await?;
        self.sessions.mark_customer_messages_read(id).await?;
        let messages = self.sessions.list_messages(id).await?;
        Ok((session, messages))
    }

    async fn require_session(&self, customer_id: &str) -> ChatResult<ConversationSession> {
        self.sessions
            .find_session(customer_id)
            .await?
            .ok_or_else(|| ChatError::SessionNotFound(customer_id.to_string()))
    }
}

fn session_ref(session: &ConversationSession) -> SessionRef {
    SessionRef {
        chat_session_id: session.id,
        customer_id: session.customer_id.clone(),
    }
}

fn default_sender_name(sender_type: SenderType) -> &'static str {
    match sender_type {
        SenderType::Customer => ANONYMOUS_SENDER,
        SenderType::Admin => SUPPORT_SENDER,
        SenderType::System => SYSTEM_SENDER,
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    let value = value.trim();
    let chosen = if value.is_empty() { fallback } else { value };
    chosen.to_string()
}

pub fn validate_customer_id(customer_id: &str) -> ChatResult<()> {
    let trimmed = customer_id.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation("customer_id is required".into()));
    }
    if trimmed.len() != customer_id.len() || customer_id.chars().count() > MAX_CUSTOMER_ID_LEN {
        return Err(ChatError::Validation(format!(
            "customer_id must be at most {MAX_CUSTOMER_ID_LEN} characters without surrounding whitespace"
        )));
    }
    Ok(())
}

fn validate_content(post: &PostMessage) -> ChatResult<()> {
    let has_attachment = post.attachment.as_deref().is_some_and(|p| !p.trim().is_empty());
    if post.content.trim().is_empty() && !has_attachment {
        return Err(ChatError::Validation("message must not be empty".into()));
    }
    Ok(())
}
