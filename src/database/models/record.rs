use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

pub const RECORD_TYPES: &[&str] = &["diagnosis", "prescription", "lab_result", "note", "imaging", "other"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub title: String,
    pub record_type: String,
    pub description: Option<String>,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn is_known_record_type(record_type: &str) -> bool {
    RECORD_TYPES.contains(&record_type)
}
