//! Postgres-backed session and rule store

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use parley_shared::{
    join_keywords, parse_keywords, AutomatedResponseLog, AutomatedResponseRule, ChatError,
    ChatResult, ConversationSession, CustomerProfile, Message, MessageId, NewMessage,
    NewResponseLog, NewRule, RuleId, SessionId, SessionStatus, SessionSummary, TriggerType,
};

use super::{RuleStore, SessionStore};

const SESSION_COLUMNS: &str = "id, customer_id, customer_name, customer_email, status, \
                               admin_user_id, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, session_id, content, sender_type, sender_name, attachment, is_read, created_at";

const RULE_COLUMNS: &str =
    "id, name, trigger_type, keywords, response_message, is_active, priority, delay_seconds";

const LOG_COLUMNS: &str =
    "id, session_id, automated_response_id, message_id, trigger_message_content, sent_at";

/// Store backed by the `chat_*` and `automated_*` tables
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    customer_id: String,
    customer_name: Option<String>,
    customer_email: Option<String>,
    status: String,
    admin_user_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<SessionRow> for ConversationSession {
    type Error = ChatError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            status: row.status.parse()?,
            admin_user_id: row.admin_user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct UpsertedSessionRow {
    #[sqlx(flatten)]
    session: SessionRow,
    created: bool,
}

#[derive(FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    session: SessionRow,
    unread_count: i64,
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    content: String,
    sender_type: String,
    sender_name: Option<String>,
    attachment: Option<String>,
    is_read: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRow> for Message {
    type Error = ChatError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            session_id: row.session_id.into(),
            content: row.content,
            sender_type: row.sender_type.parse()?,
            sender_name: row.sender_name,
            attachment: row.attachment,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct RuleRow {
    id: i64,
    name: String,
    trigger_type: String,
    keywords: String,
    response_message: String,
    is_active: bool,
    priority: i32,
    delay_seconds: i32,
}

impl TryFrom<RuleRow> for AutomatedResponseRule {
    type Error = ChatError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: RuleId(row.id),
            name: row.name,
            trigger_type: row.trigger_type.parse()?,
            keywords: parse_keywords(&row.keywords),
            response_message: row.response_message,
            is_active: row.is_active,
            priority: row.priority,
            delay_seconds: u32::try_from(row.delay_seconds).unwrap_or(0),
        })
    }
}

#[derive(FromRow)]
struct LogRow {
    id: i64,
    session_id: Uuid,
    automated_response_id: Option<i64>,
    message_id: Option<Uuid>,
    trigger_message_content: String,
    sent_at: OffsetDateTime,
}

impl From<LogRow> for AutomatedResponseLog {
    fn from(row: LogRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id.into(),
            rule_id: row.automated_response_id.map(RuleId),
            message_id: row.message_id.map(MessageId),
            trigger_message_content: row.trigger_message_content,
            sent_at: row.sent_at,
        }
    }
}

// =============================================================================
// SessionStore
// =============================================================================

/// Insert one transcript row inside an open transaction
async fn insert_message_row(tx: &mut Transaction<'_, Postgres>, message: &NewMessage) -> ChatResult<MessageRow> {
    let row = sqlx::query_as(&format!(
        r#"
        INSERT INTO chat_messages (id, session_id, content, sender_type, sender_name, attachment)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(message.session_id.0)
    .bind(&message.content)
    .bind(message.sender_type.as_str())
    .bind(message.sender_name.as_deref())
    .bind(message.attachment.as_deref())
    .fetch_one(&mut **tx)
    .await?;

    Ok(row)
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn get_or_create_session(
        &self,
        customer_id: &str,
        profile: &CustomerProfile,
    ) -> ChatResult<(ConversationSession, bool)> {
        // xmax = 0 only for freshly inserted tuples
        let row: UpsertedSessionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO chat_sessions (id, customer_id, customer_name, customer_email, status)
            VALUES ($1, $2, $3, $4, 'open')
            ON CONFLICT (customer_id) DO UPDATE SET
              customer_name = COALESCE(NULLIF(chat_sessions.customer_name, ''), EXCLUDED.customer_name),
              customer_email = COALESCE(NULLIF(chat_sessions.customer_email, ''), EXCLUDED.customer_email),
              updated_at = NOW()
            RETURNING {SESSION_COLUMNS}, (xmax = 0) AS created
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(profile.name.as_deref())
        .bind(profile.email.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok((row.session.try_into()?, row.created))
    }

    async fn find_session(&self, customer_id: &str) -> ChatResult<Option<ConversationSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE customer_id = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_session_by_id(&self, id: SessionId) -> ChatResult<Option<ConversationSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_sessions(&self, status: Option<SessionStatus>) -> ChatResult<Vec<SessionSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.customer_id, s.customer_name, s.customer_email, s.status,
                   s.admin_user_id, s.created_at, s.updated_at,
                   COALESCE(u.unread, 0) AS unread_count
            FROM chat_sessions s
            LEFT JOIN (
                SELECT session_id, COUNT(*) AS unread
                FROM chat_messages
                WHERE sender_type = 'customer' AND is_read = FALSE
                GROUP BY session_id
            ) u ON u.session_id = s.id
            WHERE ($1::VARCHAR IS NULL OR s.status = $1)
            ORDER BY s.updated_at DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SessionSummary {
                    session: row.session.try_into()?,
                    unread_count: row.unread_count,
                })
            })
            .collect()
    }

    async fn transition_status(&self, status: SessionStatus, note: NewMessage) -> ChatResult<(ConversationSession, Message)> {
        let mut tx = self.pool.begin().await?;

        let session: Option<SessionRow> = sqlx::query_as(&format!(
            r#"
            UPDATE chat_sessions
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(note.session_id.0)
        .bind(status.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let session = session.ok_or_else(|| ChatError::SessionNotFound(note.session_id.to_string()))?;
        let message = insert_message_row(&mut tx, &note).await?;

        tx.commit().await?;
        Ok((session.try_into()?, message.try_into()?))
    }

    async fn insert_message(&self, message: NewMessage) -> ChatResult<Message> {
        let mut tx = self.pool.begin().await?;

        let touched: Option<Uuid> = sqlx::query_scalar(
            "UPDATE chat_sessions SET updated_at = NOW() WHERE id = $1 RETURNING id",
        )
        .bind(message.session_id.0)
        .fetch_optional(&mut *tx)
        .await?;

        if touched.is_none() {
            return Err(ChatError::SessionNotFound(message.session_id.to_string()));
        }

        let row = insert_message_row(&mut tx, &message).await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn mark_customer_messages_read(&self, id: SessionId) -> ChatResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE chat_messages
            SET is_read = TRUE
            WHERE session_id = $1 AND sender_type = 'customer' AND is_read = FALSE
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_messages(&self, id: SessionId) -> ChatResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY created_at ASC, seq ASC
            "#
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn first_customer_message_id(&self, id: SessionId) -> ChatResult<Option<MessageId>> {
        let first: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM chat_messages
            WHERE session_id = $1 AND sender_type = 'customer'
            ORDER BY created_at ASC, seq ASC
            LIMIT 1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(first.map(MessageId))
    }
}

// =============================================================================
// RuleStore
// =============================================================================

#[async_trait]
impl RuleStore for PostgresStore {
    async fn active_rules(&self, trigger: TriggerType) -> ChatResult<Vec<AutomatedResponseRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            r#"
            SELECT {RULE_COLUMNS}
            FROM automated_responses
            WHERE trigger_type = $1 AND is_active = TRUE
            ORDER BY priority DESC, id ASC
            "#
        ))
        .bind(trigger.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn ensure_rule(&self, rule: NewRule) -> ChatResult<(AutomatedResponseRule, bool)> {
        let existing: Option<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM automated_responses WHERE name = $1 AND trigger_type = $2"
        ))
        .bind(&rule.name)
        .bind(rule.trigger_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok((row.try_into()?, false));
        }

        let delay_seconds = i32::try_from(rule.delay_seconds)
            .map_err(|_| ChatError::Validation("delay_seconds out of range".into()))?;

        let row: RuleRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO automated_responses
                (name, trigger_type, keywords, response_message, is_active, priority, delay_seconds)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(&rule.name)
        .bind(rule.trigger_type.as_str())
        .bind(join_keywords(&rule.keywords))
        .bind(&rule.response_message)
        .bind(rule.is_active)
        .bind(rule.priority)
        .bind(delay_seconds)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.try_into()?, true))
    }

    async fn insert_response_log(&self, log: NewResponseLog) -> ChatResult<AutomatedResponseLog> {
        let row: LogRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO automated_response_logs
                (session_id, automated_response_id, message_id, trigger_message_content)
            VALUES ($1, $2, $3, $4)
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(log.session_id.0)
        .bind(log.rule_id.map(|r| r.0))
        .bind(log.message_id.map(|m| m.0))
        .bind(&log.trigger_message_content)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn response_logs(&self, session_id: SessionId) -> ChatResult<Vec<AutomatedResponseLog>> {
        let rows: Vec<LogRow> = sqlx::query_as(&format!(
            r#"
            SELECT {LOG_COLUMNS}
            FROM automated_response_logs
            WHERE session_id = $1
            ORDER BY sent_at ASC, id ASC
            "#
        ))
        .bind(session_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> ChatResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
