//! Doctor–patient messaging.
//!
//! Every message body is sealed with the [`MessageCipher`] before it reaches
//! the database; the `content` column only ever receives the placeholder.
//! Status changes and sends lock the conversation row so a message cannot
//! slip in after a concurrent conclude or block.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{Attachment, MessageCipher, MessagePayload, ENCRYPTED_PLACEHOLDER};
use crate::database::models::conversation::{
    ActorKind, Conversation, ConversationAction, ConversationRow, ConversationStatus, ConversationSummary,
};
use crate::database::models::message::{Message, MessageRow};
use crate::error::ApiError;

const CONVERSATION_COLUMNS: &str = "id, doctor_id, patient_id, status, subject, created_by, concluded_at, \
     blocked_at, blocked_by, last_message_at, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, sender_type, content, encrypted_payload, read_at, created_at";

pub const MAX_CONTENT_CHARS: usize = 5000;
pub const MAX_ATTACHMENTS: usize = 10;
pub const MAX_SUBJECT_CHARS: usize = 200;

/// Shown in place of a payload that no longer opens
pub const UNREADABLE_CONTENT: &str = "[message could not be decrypted]";

#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    conversation: ConversationRow,
    unread_count: i64,
}

pub struct ConversationService {
    pool: PgPool,
    cipher: Arc<MessageCipher>,
}

impl ConversationService {
    pub fn new(pool: PgPool, cipher: Arc<MessageCipher>) -> Self {
        Self { pool, cipher }
    }

    /// Returns the pair's existing thread (`false`) or a new one (`true`).
    /// Caller has already checked the doctor exists.
    pub async fn open(
        &self,
        actor: ActorKind,
        doctor_id: Uuid,
        patient_id: Uuid,
        subject: Option<String>,
    ) -> Result<(Conversation, bool), ApiError> {
        let subject = normalize_subject(subject)?;

        let sql = format!(
            "INSERT INTO conversations (id, doctor_id, patient_id, status, subject, created_by)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (doctor_id, patient_id) DO NOTHING
             RETURNING {}",
            CONVERSATION_COLUMNS
        );
        let inserted = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(doctor_id)
            .bind(patient_id)
            .bind(ConversationStatus::Active.as_str())
            .bind(&subject)
            .bind(actor.as_str())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            let conversation = into_conversation(row)?;
            tracing::info!(
                "Conversation {} opened by {} between doctor {} and patient {}",
                conversation.id,
                actor.as_str(),
                doctor_id,
                patient_id
            );
            return Ok((conversation, true));
        }

        let sql = format!(
            "SELECT {} FROM conversations WHERE doctor_id = $1 AND patient_id = $2",
            CONVERSATION_COLUMNS
        );
        let existing = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(doctor_id)
            .bind(patient_id)
            .fetch_one(&self.pool)
            .await?;
        let existing = into_conversation(existing)?;

        if existing.status == ConversationStatus::Blocked && actor == ActorKind::Patient {
            return Err(ApiError::forbidden("This conversation has been blocked by the doctor"));
        }
        Ok((existing, false))
    }

    pub async fn list(
        &self,
        actor: ActorKind,
        actor_id: Uuid,
        status: Option<ConversationStatus>,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {}, (
                SELECT COUNT(*) FROM messages m
                WHERE m.conversation_id = c.id AND m.read_at IS NULL AND m.sender_type <> ",
            prefixed_columns("c")
        ));
        qb.push_bind(actor.as_str());
        qb.push(") AS unread_count FROM conversations c WHERE ");
        match actor {
            ActorKind::Doctor => qb.push("c.doctor_id = ").push_bind(actor_id),
            ActorKind::Patient => qb.push("c.patient_id = ").push_bind(actor_id),
        };
        if let Some(status) = status {
            qb.push(" AND c.status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY c.last_message_at DESC NULLS LAST, c.created_at DESC");

        let rows = qb.build_query_as::<SummaryRow>().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                Ok(ConversationSummary {
                    conversation: into_conversation(row.conversation)?,
                    unread_count: row.unread_count,
                })
            })
            .collect()
    }

    pub async fn get_for(&self, actor: ActorKind, actor_id: Uuid, id: Uuid) -> Result<Conversation, ApiError> {
        let sql = format!("SELECT {} FROM conversations WHERE id = $1", CONVERSATION_COLUMNS);
        let row = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        participant_view(row, actor, actor_id)
    }

    pub async fn send_message(
        &self,
        actor: ActorKind,
        actor_id: Uuid,
        id: Uuid,
        outgoing: OutgoingMessage,
    ) -> Result<Message, ApiError> {
        let payload = validate_outgoing(outgoing)?;
        let sealed = self.cipher.seal(&payload)?;

        let mut tx = self.pool.begin().await?;
        let conversation = lock_for(&mut tx, actor, actor_id, id).await?;
        ensure_accepts_messages(conversation.status)?;

        let sql = format!(
            "INSERT INTO messages (id, conversation_id, sender_id, sender_type, content, encrypted_payload)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            MESSAGE_COLUMNS
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(actor_id)
            .bind(actor.as_str())
            .bind(ENCRYPTED_PLACEHOLDER)
            .bind(&sealed)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE conversations SET last_message_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!("Stored encrypted message {} in conversation {}", row.id, id);
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            sender_type: row.sender_type,
            content: payload.content,
            attachments: payload.attachments,
            encrypted: true,
            read_at: row.read_at,
            created_at: row.created_at,
        })
    }

    /// Page of messages older than `before`, returned oldest first
    pub async fn messages(
        &self,
        actor: ActorKind,
        actor_id: Uuid,
        id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Message>, ApiError> {
        self.get_for(actor, actor_id, id).await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM messages WHERE conversation_id = ", MESSAGE_COLUMNS));
        qb.push_bind(id);
        if let Some(before) = before {
            qb.push(" AND created_at < ").push_bind(before);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        let mut rows = qb.build_query_as::<MessageRow>().fetch_all(&self.pool).await?;
        rows.reverse();

        Ok(rows.into_iter().map(|row| self.decrypt(row)).collect())
    }

    /// Marks the other side's messages as read; returns how many changed
    pub async fn mark_read(&self, actor: ActorKind, actor_id: Uuid, id: Uuid) -> Result<u64, ApiError> {
        self.get_for(actor, actor_id, id).await?;

        let result = sqlx::query(
            "UPDATE messages SET read_at = NOW()
             WHERE conversation_id = $1 AND sender_type <> $2 AND read_at IS NULL",
        )
        .bind(id)
        .bind(actor.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn apply(
        &self,
        actor: ActorKind,
        actor_id: Uuid,
        id: Uuid,
        action: ConversationAction,
    ) -> Result<Conversation, ApiError> {
        let mut tx = self.pool.begin().await?;
        let conversation = lock_for(&mut tx, actor, actor_id, id).await?;
        let next = conversation.status.transition(action, actor)?;

        let sql = format!(
            "UPDATE conversations SET
                status = $2,
                concluded_at = CASE WHEN $3::text = 'conclude' THEN NOW() WHEN $3::text = 'reopen' THEN NULL ELSE concluded_at END,
                blocked_at = CASE WHEN $3::text = 'block' THEN NOW() WHEN $3::text = 'reopen' THEN NULL ELSE blocked_at END,
                blocked_by = CASE WHEN $3::text = 'block' THEN $4::uuid WHEN $3::text = 'reopen' THEN NULL ELSE blocked_by END,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            CONVERSATION_COLUMNS
        );
        let row = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(id)
            .bind(next.as_str())
            .bind(action.to_string())
            .bind(actor_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            "Conversation {} {} -> {} ({} by {} {})",
            id,
            conversation.status,
            next,
            action,
            actor.as_str(),
            actor_id
        );
        into_conversation(row)
    }

    fn decrypt(&self, row: MessageRow) -> Message {
        let (payload, encrypted) = read_payload(&self.cipher, row.encrypted_payload.as_deref(), &row.content, row.id);
        Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            sender_type: row.sender_type,
            content: payload.content,
            attachments: payload.attachments,
            encrypted,
            read_at: row.read_at,
            created_at: row.created_at,
        }
    }
}

/// Opens a stored payload. Rows written before encryption carry plaintext
/// only; a payload that fails to open is reported, not fatal for the page.
pub(crate) fn read_payload(
    cipher: &MessageCipher,
    encrypted: Option<&[u8]>,
    plaintext: &str,
    message_id: Uuid,
) -> (MessagePayload, bool) {
    match encrypted {
        Some(blob) => match cipher.open(blob) {
            Ok(payload) => (payload, true),
            Err(e) => {
                tracing::error!("Failed to decrypt message {}: {}", message_id, e);
                (MessagePayload::text(UNREADABLE_CONTENT), true)
            }
        },
        None => (MessagePayload::text(plaintext), false),
    }
}

async fn lock_for(
    tx: &mut Transaction<'_, Postgres>,
    actor: ActorKind,
    actor_id: Uuid,
    id: Uuid,
) -> Result<Conversation, ApiError> {
    let sql = format!("SELECT {} FROM conversations WHERE id = $1 FOR UPDATE", CONVERSATION_COLUMNS);
    let row = sqlx::query_as::<_, ConversationRow>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    participant_view(row, actor, actor_id)
}

fn participant_view(row: Option<ConversationRow>, actor: ActorKind, actor_id: Uuid) -> Result<Conversation, ApiError> {
    let conversation = row
        .map(into_conversation)
        .transpose()?
        .filter(|c| c.has_participant(actor, actor_id))
        .ok_or_else(|| ApiError::not_found("Conversation not found"))?;
    Ok(conversation)
}

fn into_conversation(row: ConversationRow) -> Result<Conversation, ApiError> {
    Conversation::try_from(row).map_err(|e| {
        tracing::error!("Corrupt conversation row: {}", e);
        ApiError::internal_server_error("Stored conversation is invalid")
    })
}

fn prefixed_columns(alias: &str) -> String {
    CONVERSATION_COLUMNS
        .split(',')
        .map(|column| format!("{}.{}", alias, column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn ensure_accepts_messages(status: ConversationStatus) -> Result<(), ApiError> {
    match status {
        ConversationStatus::Active => Ok(()),
        ConversationStatus::Concluded => Err(ApiError::conflict("Conversation has been concluded")),
        ConversationStatus::Blocked => Err(ApiError::forbidden("Conversation is blocked")),
    }
}

fn normalize_subject(subject: Option<String>) -> Result<Option<String>, ApiError> {
    let subject = subject.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    if subject.as_ref().is_some_and(|s| s.chars().count() > MAX_SUBJECT_CHARS) {
        return Err(ApiError::invalid_field(
            "subject",
            format!("Subject must be at most {} characters", MAX_SUBJECT_CHARS),
        ));
    }
    Ok(subject)
}

pub fn validate_outgoing(outgoing: OutgoingMessage) -> Result<MessagePayload, ApiError> {
    let content = outgoing.content.trim().to_string();

    if content.is_empty() && outgoing.attachments.is_empty() {
        return Err(ApiError::invalid_field("content", "Message must have content or attachments"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::invalid_field(
            "content",
            format!("Message must be at most {} characters", MAX_CONTENT_CHARS),
        ));
    }
    if outgoing.attachments.len() > MAX_ATTACHMENTS {
        return Err(ApiError::invalid_field(
            "attachments",
            format!("At most {} attachments per message", MAX_ATTACHMENTS),
        ));
    }
    for attachment in &outgoing.attachments {
        if attachment.name.trim().is_empty() {
            return Err(ApiError::invalid_field("attachments", "Attachment name is required"));
        }
        if !(attachment.url.starts_with("https://") || attachment.url.starts_with("http://")) {
            return Err(ApiError::invalid_field("attachments", "Attachment url must be http(s)"));
        }
    }

    Ok(MessagePayload {
        content,
        attachments: outgoing.attachments,
        extra: None,
    })
}
