//! Doctor-to-doctor threads inside one clinic.
//!
//! Messages are sealed with the same cipher as patient conversations. A case
//! card rides in the payload's `extra` field, so the patient reference never
//! appears in plaintext either.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{MessageCipher, MessagePayload, ENCRYPTED_PLACEHOLDER};
use crate::database::models::collab::{
    ordered_pair, CaseCard, CollabMessage, CollabMessageKind, CollabMessageRow, CollabThread, CollabThreadSummary,
};
use crate::error::ApiError;
use crate::middleware::DoctorActor;
use crate::services::conversation_service::{read_payload, MAX_CONTENT_CHARS};
use crate::services::patient_service::doctor_knows_patient;
use crate::services::DoctorService;

const THREAD_COLUMNS: &str = "id, clinic, doctor_a, doctor_b, last_message_at, created_at";
const COLLAB_MESSAGE_COLUMNS: &str = "id, thread_id, sender_id, kind, content, encrypted_payload, created_at";

const MAX_CASE_SUMMARY_CHARS: usize = 2000;

/// Either plain text or a shared case; `case_card` wins when both are sent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutgoingCollabMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub case_card: Option<CaseCard>,
}

#[derive(FromRow)]
struct ThreadSummaryRow {
    id: Uuid,
    peer_id: Uuid,
    peer_name: String,
    peer_specialty: Option<String>,
    last_message_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

pub struct CollabService {
    pool: PgPool,
    cipher: Arc<MessageCipher>,
}

impl CollabService {
    pub fn new(pool: PgPool, cipher: Arc<MessageCipher>) -> Self {
        Self { pool, cipher }
    }

    /// Returns the pair's thread, creating it on first contact
    pub async fn open_thread(&self, me: &DoctorActor, peer_id: Uuid) -> Result<(CollabThread, bool), ApiError> {
        if peer_id == me.id {
            return Err(ApiError::invalid_field("doctor_id", "Cannot open a thread with yourself"));
        }

        let peer = DoctorService::new(self.pool.clone()).find_active(peer_id).await?;
        if peer.clinic != me.clinic {
            return Err(ApiError::forbidden("Collaboration is limited to doctors in your clinic"));
        }

        let (doctor_a, doctor_b) = ordered_pair(me.id, peer_id);
        let sql = format!(
            "INSERT INTO collab_threads (id, clinic, doctor_a, doctor_b)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (doctor_a, doctor_b) DO NOTHING
             RETURNING {}",
            THREAD_COLUMNS
        );
        let inserted = sqlx::query_as::<_, CollabThread>(&sql)
            .bind(Uuid::new_v4())
            .bind(&me.clinic)
            .bind(doctor_a)
            .bind(doctor_b)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(thread) = inserted {
            tracing::info!("Collaboration thread {} opened by {} with {}", thread.id, me.id, thread.peer_of(me.id));
            return Ok((thread, true));
        }

        let sql = format!(
            "SELECT {} FROM collab_threads WHERE doctor_a = $1 AND doctor_b = $2",
            THREAD_COLUMNS
        );
        let thread = sqlx::query_as::<_, CollabThread>(&sql)
            .bind(doctor_a)
            .bind(doctor_b)
            .fetch_one(&self.pool)
            .await?;
        Ok((thread, false))
    }

    pub async fn list_threads(&self, doctor_id: Uuid) -> Result<Vec<CollabThreadSummary>, ApiError> {
        let rows = sqlx::query_as::<_, ThreadSummaryRow>(
            "SELECT t.id, d.id AS peer_id, d.name AS peer_name, d.specialty AS peer_specialty,
                    t.last_message_at, t.created_at
             FROM collab_threads t
             JOIN doctors d ON d.id = CASE WHEN t.doctor_a = $1 THEN t.doctor_b ELSE t.doctor_a END
             WHERE t.doctor_a = $1 OR t.doctor_b = $1
             ORDER BY t.last_message_at DESC NULLS LAST, t.created_at DESC",
        )
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CollabThreadSummary {
                id: row.id,
                peer_id: row.peer_id,
                peer_name: row.peer_name,
                peer_specialty: row.peer_specialty,
                last_message_at: row.last_message_at,
                created_at: row.created_at,
            })
            .collect())
    }

    pub async fn messages(
        &self,
        doctor_id: Uuid,
        thread_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<CollabMessage>, ApiError> {
        self.thread_for(doctor_id, thread_id).await?;

        let sql = format!(
            "SELECT {} FROM collab_messages
             WHERE thread_id = $1 AND ($2::timestamptz IS NULL OR created_at < $2)
             ORDER BY created_at DESC
             LIMIT $3",
            COLLAB_MESSAGE_COLUMNS
        );
        let mut rows = sqlx::query_as::<_, CollabMessageRow>(&sql)
            .bind(thread_id)
            .bind(before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.reverse();

        Ok(rows.into_iter().map(|row| self.decrypt(row)).collect())
    }

    pub async fn send(
        &self,
        doctor_id: Uuid,
        thread_id: Uuid,
        outgoing: OutgoingCollabMessage,
    ) -> Result<CollabMessage, ApiError> {
        self.thread_for(doctor_id, thread_id).await?;

        let (kind, payload) = build_payload(outgoing)?;
        if let Some(card) = case_card_of(&payload) {
            if !doctor_knows_patient(&self.pool, doctor_id, card.patient_id).await? {
                return Err(ApiError::not_found("Patient not found"));
            }
        }
        let sealed = self.cipher.seal(&payload)?;

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO collab_messages (id, thread_id, sender_id, kind, content, encrypted_payload)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            COLLAB_MESSAGE_COLUMNS
        );
        let row = sqlx::query_as::<_, CollabMessageRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(thread_id)
            .bind(doctor_id)
            .bind(kind.as_str())
            .bind(ENCRYPTED_PLACEHOLDER)
            .bind(&sealed)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE collab_threads SET last_message_at = $2 WHERE id = $1")
            .bind(thread_id)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!("Stored {} collab message {} in thread {}", kind.as_str(), row.id, thread_id);
        Ok(CollabMessage {
            id: row.id,
            thread_id: row.thread_id,
            sender_id: row.sender_id,
            kind: row.kind,
            case_card: case_card_of(&payload),
            content: payload.content,
            created_at: row.created_at,
        })
    }

    async fn thread_for(&self, doctor_id: Uuid, thread_id: Uuid) -> Result<CollabThread, ApiError> {
        let sql = format!("SELECT {} FROM collab_threads WHERE id = $1", THREAD_COLUMNS);
        sqlx::query_as::<_, CollabThread>(&sql)
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?
            .filter(|thread| thread.has_member(doctor_id))
            .ok_or_else(|| ApiError::not_found("Thread not found"))
    }

    fn decrypt(&self, row: CollabMessageRow) -> CollabMessage {
        let (payload, _) = read_payload(&self.cipher, row.encrypted_payload.as_deref(), &row.content, row.id);
        CollabMessage {
            id: row.id,
            thread_id: row.thread_id,
            sender_id: row.sender_id,
            kind: row.kind,
            case_card: case_card_of(&payload),
            content: payload.content,
            created_at: row.created_at,
        }
    }
}

fn build_payload(outgoing: OutgoingCollabMessage) -> Result<(CollabMessageKind, MessagePayload), ApiError> {
    if let Some(mut card) = outgoing.case_card {
        card.summary = card.summary.trim().to_string();
        if card.summary.is_empty() {
            return Err(ApiError::invalid_field("case_card.summary", "Case summary is required"));
        }
        if card.summary.chars().count() > MAX_CASE_SUMMARY_CHARS {
            return Err(ApiError::invalid_field(
                "case_card.summary",
                format!("Case summary must be at most {} characters", MAX_CASE_SUMMARY_CHARS),
            ));
        }
        let content = outgoing
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| card.summary.clone());
        check_content_length(&content)?;
        let extra = serde_json::to_value(&card).map_err(|e| {
            tracing::error!("Failed to encode case card: {}", e);
            ApiError::internal_server_error("Failed to encode case card")
        })?;
        return Ok((
            CollabMessageKind::CaseCard,
            MessagePayload {
                content,
                attachments: Vec::new(),
                extra: Some(extra),
            },
        ));
    }

    let content = outgoing.content.unwrap_or_default().trim().to_string();
    if content.is_empty() {
        return Err(ApiError::invalid_field("content", "Message content is required"));
    }
    check_content_length(&content)?;
    Ok((CollabMessageKind::Text, MessagePayload::text(content)))
}

fn check_content_length(content: &str) -> Result<(), ApiError> {
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::invalid_field(
            "content",
            format!("Message must be at most {} characters", MAX_CONTENT_CHARS),
        ));
    }
    Ok(())
}

fn case_card_of(payload: &MessagePayload) -> Option<CaseCard> {
    payload
        .extra
        .as_ref()
        .and_then(|extra| serde_json::from_value(extra.clone()).ok())
}
