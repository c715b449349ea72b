//! Persistence interfaces consumed by the chat core
//!
//! The controller and the automated response engine only talk to these
//! traits. Each operation is expected to be atomic at the single-record
//! level; the core performs no retries of its own.

mod memory;
mod postgres;

use async_trait::async_trait;
use parley_shared::{
    AutomatedResponseLog, AutomatedResponseRule, ChatResult, ConversationSession,
    CustomerProfile, Message, MessageId, NewMessage, NewResponseLog, NewRule, SessionId,
    SessionStatus, SessionSummary, TriggerType,
};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Durable record of conversations and their messages
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session by customer id, creating it when absent.
    ///
    /// Name and email from `profile` are only written where the stored value
    /// is empty. Touches `updated_at`. Returns the session and whether it was
    /// created by this call.
    async fn get_or_create_session(
        &self,
        customer_id: &str,
        profile: &CustomerProfile,
    ) -> ChatResult<(ConversationSession, bool)>;

    async fn find_session(&self, customer_id: &str) -> ChatResult<Option<ConversationSession>>;

    async fn find_session_by_id(&self, id: SessionId) -> ChatResult<Option<ConversationSession>>;

    /// Sessions ordered by most recent activity, with unread customer
    /// message counts
    async fn list_sessions(&self, status: Option<SessionStatus>) -> ChatResult<Vec<SessionSummary>>;

    /// Set the status of `note.session_id` and append `note` to its
    /// transcript as one atomic step. Touches `updated_at`.
    async fn transition_status(&self, status: SessionStatus, note: NewMessage) -> ChatResult<(ConversationSession, Message)>;

    /// Insert a message and touch the owning session's `updated_at`
    async fn insert_message(&self, message: NewMessage) -> ChatResult<Message>;

    /// Mark every unread customer-authored message of the session read
    async fn mark_customer_messages_read(&self, id: SessionId) -> ChatResult<u64>;

    /// Messages of the session in creation order
    async fn list_messages(&self, id: SessionId) -> ChatResult<Vec<Message>>;

    /// Id of the earliest customer-authored message of the session
    async fn first_customer_message_id(&self, id: SessionId) -> ChatResult<Option<MessageId>>;
}

/// Automated response rules and their dispatch log
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active rules of one trigger type, highest priority first
    async fn active_rules(&self, trigger: TriggerType) -> ChatResult<Vec<AutomatedResponseRule>>;

    /// Insert the rule unless one with the same name and trigger type exists.
    /// Returns the stored rule and whether it was created.
    async fn ensure_rule(&self, rule: NewRule) -> ChatResult<(AutomatedResponseRule, bool)>;

    async fn insert_response_log(&self, log: NewResponseLog) -> ChatResult<AutomatedResponseLog>;

    async fn response_logs(&self, session_id: SessionId) -> ChatResult<Vec<AutomatedResponseLog>>;

    /// Cheap connectivity probe for readiness checks
    async fn ping(&self) -> ChatResult<()>;
}
