//! Common types used across Parley

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ChatError;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Chat session ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Message ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Automated response rule ID wrapper (database serial)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub i64);

impl From<i64> for RuleId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(ChatError::Validation(format!("Invalid status: {other}"))),
        }
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Customer,
    Admin,
    System,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl FromStr for SenderType {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            other => Err(ChatError::Validation(format!("Invalid sender type: {other}"))),
        }
    }
}

/// Condition category that can activate an automated response rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Keyword,
    Greeting,
    FirstMessage,
    Offline,
    BusinessHours,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Greeting => "greeting",
            Self::FirstMessage => "first_message",
            Self::Offline => "offline",
            Self::BusinessHours => "business_hours",
        }
    }
}

impl FromStr for TriggerType {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(Self::Keyword),
            "greeting" => Ok(Self::Greeting),
            "first_message" => Ok(Self::FirstMessage),
            "offline" => Ok(Self::Offline),
            "business_hours" => Ok(Self::BusinessHours),
            other => Err(ChatError::Validation(format!("Invalid trigger type: {other}"))),
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Conversations
// =============================================================================

/// One customer's conversation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: SessionId,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub status: SessionStatus,
    pub admin_user_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ConversationSession {
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

/// Session as listed on the admin dashboard
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: ConversationSession,
    pub unread_count: i64,
}

/// Optional customer details supplied when a chat starts.
///
/// Blank strings are treated the same as absent values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerProfile {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl CustomerProfile {
    pub fn new(name: Option<String>, email: Option<String>) -> Self {
        Self {
            name: non_blank(name),
            email: non_blank(email),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Individual message in a chat session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub content: String,
    pub sender_type: SenderType,
    pub sender_name: Option<String>,
    /// Storage path of an uploaded attachment
    pub attachment: Option<String>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Message about to be persisted
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: SessionId,
    pub content: String,
    pub sender_type: SenderType,
    pub sender_name: Option<String>,
    pub attachment: Option<String>,
}

// =============================================================================
// Automated Responses
// =============================================================================

/// Scripted reply fired when its trigger condition holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatedResponseRule {
    pub id: RuleId,
    pub name: String,
    pub trigger_type: TriggerType,
    /// Lowercased, trimmed keywords. Only used by keyword rules.
    pub keywords: Vec<String>,
    pub response_message: String,
    pub is_active: bool,
    /// Higher priority rules fire first
    pub priority: i32,
    pub delay_seconds: u32,
}

impl AutomatedResponseRule {
    /// Case-insensitive substring match of any keyword against `text`
    pub fn matches_keywords(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|keyword| text.contains(keyword.as_str()))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.delay_seconds))
    }
}

/// Split a comma-separated keyword list as stored with a rule
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Join keywords back into their stored form
pub fn join_keywords(keywords: &[String]) -> String {
    keywords.join(", ")
}

/// Rule definition before it is stored
#[derive(Debug, Clone)]
pub struct NewRule {
    pub name: String,
    pub trigger_type: TriggerType,
    pub keywords: Vec<String>,
    pub response_message: String,
    pub is_active: bool,
    pub priority: i32,
    pub delay_seconds: u32,
}

/// Record of one automated reply that was sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutomatedResponseLog {
    pub id: i64,
    pub session_id: SessionId,
    pub rule_id: Option<RuleId>,
    pub message_id: Option<MessageId>,
    pub trigger_message_content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

/// Log row about to be persisted
#[derive(Debug, Clone)]
pub struct NewResponseLog {
    pub session_id: SessionId,
    pub rule_id: Option<RuleId>,
    pub message_id: Option<MessageId>,
    pub trigger_message_content: String,
}
