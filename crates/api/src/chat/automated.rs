//! Automated response engine
//!
//! Decides which rules fire for an incoming customer message and sends the
//! replies as system messages: trigger checks in a fixed order, rules of one
//! trigger by descending priority.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use parley_shared::{
    AutomatedResponseLog, AutomatedResponseRule, ChatResult, ConversationSession, Message,
    NewResponseLog, RuleId, SenderType, TriggerType,
};

use super::business_hours::BusinessHours;
use super::controller::{ConversationController, PostMessage, SessionPolicy};
use super::presence::StaffPresence;
use crate::store::RuleStore;

/// Sender name on automated replies
pub const AUTO_RESPONSE_SENDER: &str = "Auto-response";

/// Phrases that make a message count as a greeting
pub const GREETING_PHRASES: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
];

/// Order in which trigger types are evaluated
pub const TRIGGER_ORDER: [TriggerType; 5] = [
    TriggerType::FirstMessage,
    TriggerType::Greeting,
    TriggerType::Keyword,
    TriggerType::Offline,
    TriggerType::BusinessHours,
];

/// Wall-clock source, replaceable in tests
pub type Clock = fn() -> OffsetDateTime;

/// Case-insensitive check for any greeting phrase as a substring
pub fn is_greeting(text: &str) -> bool {
    let text = text.to_lowercase();
    GREETING_PHRASES.iter().any(|phrase| text.contains(phrase))
}

/// Drop repeated rules, keeping the first occurrence
pub fn dedup_rules(rules: Vec<AutomatedResponseRule>) -> Vec<AutomatedResponseRule> {
    let mut seen = HashSet::new();
    rules.into_iter().filter(|rule| seen.insert(rule.id)).collect()
}

/// One reply that made it into the conversation
#[derive(Debug, Clone)]
pub struct DispatchedReply {
    pub rule_id: RuleId,
    pub message: Message,
    /// Absent when the message was sent but the log write failed
    pub log: Option<AutomatedResponseLog>,
}

pub struct AutomatedResponseEngine {
    controller: Arc<ConversationController>,
    rules: Arc<dyn RuleStore>,
    presence: Arc<dyn StaffPresence>,
    business_hours: Option<BusinessHours>,
    clock: Clock,
}

impl AutomatedResponseEngine {
    pub fn new(
        controller: Arc<ConversationController>,
        rules: Arc<dyn RuleStore>,
        presence: Arc<dyn StaffPresence>,
        business_hours: Option<BusinessHours>,
    ) -> Self {
        Self {
            controller,
            rules,
            presence,
            business_hours,
            clock: OffsetDateTime::now_utc,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Select the rules that fire for `message` and send their replies
    pub async fn respond(
        &self,
        session: &ConversationSession,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Vec<DispatchedReply> {
        if message.sender_type != SenderType::Customer {
            return Vec::new();
        }

        let rules = self.select_rules(session, message).await;
        if rules.is_empty() {
            return Vec::new();
        }

        tracing::debug!(
            session_id = %session.id,
            message_id = %message.id,
            rules = rules.len(),
            "Automated responses selected"
        );

        self.dispatch(session, &message.content, rules, cancel).await
    }

    /// Trigger types whose condition holds for this message
    pub async fn eligible_triggers(&self, session: &ConversationSession, message: &Message) -> Vec<TriggerType> {
        let mut eligible = Vec::new();
        for trigger in TRIGGER_ORDER {
            match self.is_eligible(trigger, session, message).await {
                Ok(true) => eligible.push(trigger),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.id,
                        trigger = %trigger,
                        error = %e,
                        "Could not evaluate trigger, skipping"
                    );
                }
            }
        }
        eligible
    }

    async fn is_eligible(
        &self,
        trigger: TriggerType,
        session: &ConversationSession,
        message: &Message,
    ) -> ChatResult<bool> {
        Ok(match trigger {
            TriggerType::FirstMessage => {
                self.controller.sessions().first_customer_message_id(session.id).await? == Some(message.id)
            }
            TriggerType::Greeting => is_greeting(&message.content),
            // Matching happens per rule
            TriggerType::Keyword => true,
            TriggerType::Offline => !self.presence.any_staff_available().await?,
            TriggerType::BusinessHours => match &self.business_hours {
                Some(hours) => !hours.is_open_at((self.clock)()),
                None => false,
            },
        })
    }

    /// Rules that fire for `message`, deduplicated, in firing order
    pub async fn select_rules(&self, session: &ConversationSession, message: &Message) -> Vec<AutomatedResponseRule> {
        let mut selected = Vec::new();

        for trigger in self.eligible_triggers(session, message).await {
            let rules = match self.rules.active_rules(trigger).await {
                Ok(rules) => rules,
                Err(e) => {
                    tracing::warn!(trigger = %trigger, error = %e, "Failed to load automated response rules");
                    continue;
                }
            };

            let mut group: Vec<_> = rules
                .into_iter()
                .filter(|rule| trigger != TriggerType::Keyword || rule.matches_keywords(&message.content))
                .collect();
            group.sort_by_key(|rule| Reverse(rule.priority));

            // Groups concatenate in check order; priority only ranks within one
            selected.extend(group);
        }

        dedup_rules(selected)
    }

    /// Send each rule's reply in order, honoring its delay.
    ///
    /// Cancellation only interrupts a pending delay; a reply already being
    /// persisted completes. A rule that fails to send is skipped.
    pub async fn dispatch(
        &self,
        session: &ConversationSession,
        trigger_content: &str,
        rules: Vec<AutomatedResponseRule>,
        cancel: &CancellationToken,
    ) -> Vec<DispatchedReply> {
        let mut sent = Vec::with_capacity(rules.len());

        for rule in rules {
            if rule.delay_seconds > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(rule.delay()) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                tracing::info!(
                    session_id = %session.id,
                    remaining_from = %rule.id,
                    "Automated responses cancelled"
                );
                break;
            }

            match self.send_reply(session, trigger_content, &rule).await {
                Ok(reply) => sent.push(reply),
                Err(e) => {
                    tracing::error!(
                        session_id = %session.id,
                        rule_id = %rule.id,
                        error = %e,
                        "Failed to send automated response"
                    );
                }
            }
        }

        sent
    }

    async fn send_reply(
        &self,
        session: &ConversationSession,
        trigger_content: &str,
        rule: &AutomatedResponseRule,
    ) -> ChatResult<DispatchedReply> {
        let guard = self.controller.lock_session(&session.customer_id).await;

        let posted = self
            .controller
            .persist_message(
                &guard,
                PostMessage::new(&session.customer_id, &rule.response_message, SenderType::System)
                    .sender_name(Some(AUTO_RESPONSE_SENDER.to_string())),
                SessionPolicy::MustExist,
            )
            .await?;

        let log = match self
            .rules
            .insert_response_log(NewResponseLog {
                session_id: posted.session.id,
                rule_id: Some(rule.id),
                message_id: Some(posted.message.id),
                trigger_message_content: trigger_content.to_string(),
            })
            .await
        {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::error!(
                    session_id = %posted.session.id,
                    rule_id = %rule.id,
                    error = %e,
                    "Failed to record automated response"
                );
                None
            }
        };

        self.controller.publish_message(&guard, &posted).await;

        tracing::info!(
            session_id = %posted.session.id,
            rule_id = %rule.id,
            rule = %rule.name,
            trigger = %rule.trigger_type,
            "Automated response sent"
        );

        Ok(DispatchedReply {
            rule_id: rule.id,
            message: posted.message,
            log,
        })
    }
}
