use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub specialty: Option<String>,
    pub bio: Option<String>,
    pub clinic: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Directory entry shown to colleagues
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoctorSummary {
    pub id: Uuid,
    pub name: String,
    pub specialty: Option<String>,
}
