use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CollabThread {
    pub id: Uuid,
    pub clinic: String,
    pub doctor_a: Uuid,
    pub doctor_b: Uuid,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CollabThread {
    pub fn has_member(&self, doctor_id: Uuid) -> bool {
        self.doctor_a == doctor_id || self.doctor_b == doctor_id
    }

    pub fn peer_of(&self, doctor_id: Uuid) -> Uuid {
        if self.doctor_a == doctor_id {
            self.doctor_b
        } else {
            self.doctor_a
        }
    }
}

/// Threads store the pair in ascending order so each pair maps to one row
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Thread listing row joined with the peer doctor
#[derive(Debug, Clone, Serialize)]
pub struct CollabThreadSummary {
    pub id: Uuid,
    pub peer_id: Uuid,
    pub peer_name: String,
    pub peer_specialty: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollabMessageKind {
    Text,
    CaseCard,
}

impl CollabMessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollabMessageKind::Text => "text",
            CollabMessageKind::CaseCard => "case_card",
        }
    }
}

/// Patient case shared between colleagues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseCard {
    pub patient_id: Uuid,
    #[serde(default)]
    pub patient_name: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub record_ids: Vec<Uuid>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CollabMessageRow {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub kind: String,
    pub content: String,
    pub encrypted_payload: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollabMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub kind: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_card: Option<CaseCard>,
    pub created_at: DateTime<Utc>,
}
