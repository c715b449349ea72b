//! In-process store used for development and tests
//!
//! Nothing survives a restart. Used when no `DATABASE_URL` is configured.

use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use parley_shared::{
    AutomatedResponseLog, AutomatedResponseRule, ChatError, ChatResult, ConversationSession,
    CustomerProfile, Message, MessageId, NewMessage, NewResponseLog, NewRule, RuleId,
    SenderType, SessionId, SessionStatus, SessionSummary, TriggerType,
};

use super::{RuleStore, SessionStore};

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, ConversationSession>,
    by_customer: HashMap<String, SessionId>,
    messages: HashMap<SessionId, Vec<Message>>,
    rules: Vec<AutomatedResponseRule>,
    logs: Vec<AutomatedResponseLog>,
}

/// Session and rule store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Current time, never earlier than `floor`
fn timestamp_after(floor: Option<OffsetDateTime>) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    match floor {
        Some(floor) if floor > now => floor,
        _ => now,
    }
}

impl Inner {
    fn session_mut(&mut self, id: SessionId) -> ChatResult<&mut ConversationSession> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))
    }

    /// Append a message and touch its session. Fails without side effects
    /// when the session is unknown.
    fn push_message(&mut self, new: NewMessage) -> ChatResult<Message> {
        let last = self
            .messages
            .get(&new.session_id)
            .and_then(|msgs| msgs.last())
            .map(|m| m.created_at);
        let created_at = timestamp_after(last);

        let session = self.session_mut(new.session_id)?;
        session.updated_at = timestamp_after(Some(session.updated_at.max(created_at)));

        let message = Message {
            id: MessageId::new(),
            session_id: new.session_id,
            content: new.content,
            sender_type: new.sender_type,
            sender_name: new.sender_name,
            attachment: new.attachment,
            is_read: false,
            created_at,
        };
        self.messages
            .entry(message.session_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    fn unread_count(&self, id: SessionId) -> i64 {
        self.messages
            .get(&id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| m.sender_type == SenderType::Customer && !m.is_read)
                    .count() as i64
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_or_create_session(
        &self,
        customer_id: &str,
        profile: &CustomerProfile,
    ) -> ChatResult<(ConversationSession, bool)> {
        let mut inner = self.inner.write().await;

        if let Some(id) = inner.by_customer.get(customer_id).copied() {
            let session = inner.session_mut(id)?;
            if session.customer_name.is_none() {
                session.customer_name = profile.name.clone();
            }
            if session.customer_email.is_none() {
                session.customer_email = profile.email.clone();
            }
            session.updated_at = timestamp_after(Some(session.updated_at));
            return Ok((session.clone(), false));
        }

        let now = OffsetDateTime::now_utc();
        let session = ConversationSession {
            id: SessionId::new(),
            customer_id: customer_id.to_string(),
            customer_name: profile.name.clone(),
            customer_email: profile.email.clone(),
            status: SessionStatus::Open,
            admin_user_id: None,
            created_at: now,
            updated_at: now,
        };
        inner.by_customer.insert(customer_id.to_string(), session.id);
        inner.sessions.insert(session.id, session.clone());
        Ok((session, true))
    }

    async fn find_session(&self, customer_id: &str) -> ChatResult<Option<ConversationSession>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_customer
            .get(customer_id)
            .and_then(|id| inner.sessions.get(id))
            .cloned())
    }

    async fn find_session_by_id(&self, id: SessionId) -> ChatResult<Option<ConversationSession>> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn list_sessions(&self, status: Option<SessionStatus>) -> ChatResult<Vec<SessionSummary>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<SessionSummary> = inner
            .sessions
            .values()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .map(|s| SessionSummary {
                session: s.clone(),
                unread_count: inner.unread_count(s.id),
            })
            .collect();
        sessions.sort_by_key(|s| Reverse(s.session.updated_at));
        Ok(sessions)
    }

    async fn transition_status(&self, status: SessionStatus, note: NewMessage) -> ChatResult<(ConversationSession, Message)> {
        let mut inner = self.inner.write().await;
        let session_id = note.session_id;
        let message = inner.push_message(note)?;

        let session = inner.session_mut(session_id)?;
        session.status = status;
        Ok((session.clone(), message))
    }

    async fn insert_message(&self, new: NewMessage) -> ChatResult<Message> {
        self.inner.write().await.push_message(new)
    }

    async fn mark_customer_messages_read(&self, id: SessionId) -> ChatResult<u64> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        if let Some(msgs) = inner.messages.get_mut(&id) {
            for msg in msgs
                .iter_mut()
                .filter(|m| m.sender_type == SenderType::Customer && !m.is_read)
            {
                msg.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn list_messages(&self, id: SessionId) -> ChatResult<Vec<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(&id).cloned().unwrap_or_default())
    }

    async fn first_customer_message_id(&self, id: SessionId) -> ChatResult<Option<MessageId>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(&id).and_then(|msgs| {
            msgs.iter()
                .find(|m| m.sender_type == SenderType::Customer)
                .map(|m| m.id)
        }))
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn active_rules(&self, trigger: TriggerType) -> ChatResult<Vec<AutomatedResponseRule>> {
        let inner = self.inner.read().await;
        let mut rules: Vec<AutomatedResponseRule> = inner
            .rules
            .iter()
            .filter(|r| r.is_active && r.trigger_type == trigger)
            .cloned()
            .collect();
        // Stable: equal priorities keep insertion order
        rules.sort_by_key(|r| Reverse(r.priority));
        Ok(rules)
    }

    async fn ensure_rule(&self, rule: NewRule) -> ChatResult<(AutomatedResponseRule, bool)> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .rules
            .iter()
            .find(|r| r.name == rule.name && r.trigger_type == rule.trigger_type)
        {
            return Ok((existing.clone(), false));
        }

        let id = RuleId(inner.rules.len() as i64 + 1);
        let stored = AutomatedResponseRule {
            id,
            name: rule.name,
            trigger_type: rule.trigger_type,
            keywords: rule.keywords,
            response_message: rule.response_message,
            is_active: rule.is_active,
            priority: rule.priority,
            delay_seconds: rule.delay_seconds,
        };
        inner.rules.push(stored.clone());
        Ok((stored, true))
    }

    async fn insert_response_log(&self, log: NewResponseLog) -> ChatResult<AutomatedResponseLog> {
        let mut inner = self.inner.write().await;
        let stored = AutomatedResponseLog {
            id: inner.logs.len() as i64 + 1,
            session_id: log.session_id,
            rule_id: log.rule_id,
            message_id: log.message_id,
            trigger_message_content: log.trigger_message_content,
            sent_at: OffsetDateTime::now_utc(),
        };
        inner.logs.push(stored.clone());
        Ok(stored)
    }

    async fn response_logs(&self, session_id: SessionId) -> ChatResult<Vec<AutomatedResponseLog>> {
        let inner = self.inner.read().await;
        Ok(inner
            .logs
            .iter()
            .filter(|l| l.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> ChatResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, trigger: TriggerType, priority: i32) -> NewRule {
        NewRule {
            name: name.to_string(),
            trigger_type: trigger,
            keywords: Vec::new(),
            response_message: format!("{name} reply"),
            is_active: true,
            priority,
            delay_seconds: 0,
        }
    }

    fn customer_message(session_id: SessionId, content: &str) -> NewMessage {
        NewMessage {
            session_id,
            content: content.to_string(),
            sender_type: SenderType::Customer,
            sender_name: Some("Visitor".into()),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_fills_only_empty_fields() {
        let store = MemoryStore::new();
        let (first, created) = store
            .get_or_create_session("c1", &CustomerProfile::new(None, Some("a@b.c".into())))
            .await
            .unwrap();
        assert!(created);

        let (second, created) = store
            .get_or_create_session(
                "c1",
                &CustomerProfile::new(Some("Ada".into()), Some("other@b.c".into())),
            )
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.customer_name.as_deref(), Some("Ada"));
        assert_eq!(second.customer_email.as_deref(), Some("a@b.c"));
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_message_timestamps_are_non_decreasing() {
        let store = MemoryStore::new();
        let (session, _) = store
            .get_or_create_session("c1", &CustomerProfile::default())
            .await
            .unwrap();

        for i in 0..20 {
            store
                .insert_message(customer_message(session.id, &format!("msg {i}")))
                .await
                .unwrap();
        }

        let messages = store.list_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 20);
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(messages[0].content, "msg 0");
    }

    #[tokio::test]
    async fn test_mark_read_only_touches_customer_messages() {
        let store = MemoryStore::new();
        let (session, _) = store
            .get_or_create_session("c1", &CustomerProfile::default())
            .await
            .unwrap();
        store.insert_message(customer_message(session.id, "hi")).await.unwrap();
        store.insert_message(customer_message(session.id, "hello?")).await.unwrap();

        let summaries = store.list_sessions(None).await.unwrap();
        assert_eq!(summaries[0].unread_count, 2);

        assert_eq!(store.mark_customer_messages_read(session.id).await.unwrap(), 2);
        assert_eq!(store.mark_customer_messages_read(session.id).await.unwrap(), 0);
        assert_eq!(store.list_sessions(None).await.unwrap()[0].unread_count, 0);
    }

    #[tokio::test]
    async fn test_active_rules_sorted_by_priority_and_filtered() {
        let store = MemoryStore::new();
        store.ensure_rule(rule("low", TriggerType::Keyword, 1)).await.unwrap();
        store.ensure_rule(rule("high", TriggerType::Keyword, 50)).await.unwrap();
        store.ensure_rule(rule("greet", TriggerType::Greeting, 99)).await.unwrap();
        let mut inactive = rule("off", TriggerType::Keyword, 100);
        inactive.is_active = false;
        store.ensure_rule(inactive).await.unwrap();

        let names: Vec<String> = store
            .active_rules(TriggerType::Keyword)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn test_ensure_rule_is_idempotent_by_name() {
        let store = MemoryStore::new();
        let (a, created_a) = store.ensure_rule(rule("welcome", TriggerType::FirstMessage, 100)).await.unwrap();
        let (b, created_b) = store.ensure_rule(rule("welcome", TriggerType::FirstMessage, 5)).await.unwrap();
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id, b.id);
        assert_eq!(b.priority, 100);
    }

    fn note(session_id: SessionId, content: &str) -> NewMessage {
        NewMessage {
            session_id,
            content: content.into(),
            sender_type: SenderType::System,
            sender_name: Some("System".into()),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn test_transition_sets_status_and_appends_note() {
        let store = MemoryStore::new();
        let (session, _) = store
            .get_or_create_session("c1", &CustomerProfile::default())
            .await
            .unwrap();

        let (closed, message) = store
            .transition_status(SessionStatus::Closed, note(session.id, "Conversation closed by Grace"))
            .await
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert!(closed.updated_at >= message.created_at);

        let history = store.list_messages(session.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, message.id);
    }

    #[tokio::test]
    async fn test_transition_on_missing_session_changes_nothing() {
        let store = MemoryStore::new();
        let missing = SessionId::new();
        let err = store
            .transition_status(SessionStatus::Closed, note(missing, "Conversation closed by Grace"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound(_)));
        assert!(store.list_messages(missing).await.unwrap().is_empty());
    }
}
