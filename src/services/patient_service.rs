use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::appointment::Appointment;
use crate::database::models::record::MedicalRecord;
use crate::error::ApiError;
use crate::integrations::{PatientDirectory, PatientProfile};
use crate::services::appointment_service::AppointmentService;

/// Every patient a doctor has touched through an appointment, a record or a
/// conversation.
const RELATED_PATIENTS_SQL: &str = "
    SELECT patient_id FROM appointments WHERE doctor_id = $1
    UNION
    SELECT patient_id FROM medical_records WHERE doctor_id = $1
    UNION
    SELECT patient_id FROM conversations WHERE doctor_id = $1";

const UPCOMING_LIMIT: i64 = 5;
const RECENT_RECORDS_LIMIT: i64 = 5;

#[derive(Debug, Clone, FromRow)]
struct PatientActivityRow {
    patient_id: Uuid,
    patient_name: Option<String>,
    last_appointment_at: Option<DateTime<Utc>>,
    appointment_count: i64,
    record_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientListEntry {
    pub id: Uuid,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<PatientProfile>,
    pub last_appointment_at: Option<DateTime<Utc>>,
    pub appointment_count: i64,
    pub record_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDetail {
    #[serde(flatten)]
    pub summary: PatientListEntry,
    pub upcoming_appointments: Vec<Appointment>,
    pub recent_records: Vec<MedicalRecord>,
}

pub struct PatientService {
    pool: PgPool,
    directory: Option<Arc<dyn PatientDirectory>>,
}

impl PatientService {
    pub fn new(pool: PgPool, directory: Option<Arc<dyn PatientDirectory>>) -> Self {
        Self { pool, directory }
    }

    pub async fn list(&self, doctor_id: Uuid) -> Result<Vec<PatientListEntry>, ApiError> {
        let rows = self.activity(doctor_id, None).await?;
        let ids: Vec<Uuid> = rows.iter().map(|row| row.patient_id).collect();
        let mut profiles = self.profiles(&ids).await;

        Ok(rows
            .into_iter()
            .map(|row| {
                let profile = profiles.remove(&row.patient_id);
                into_entry(row, profile)
            })
            .collect())
    }

    /// Doctors only see patients they have a relationship with
    pub async fn detail(&self, doctor_id: Uuid, patient_id: Uuid) -> Result<PatientDetail, ApiError> {
        let row = self
            .activity(doctor_id, Some(patient_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found("Patient not found"))?;

        let mut profiles = self.profiles(&[patient_id]).await;
        let summary = into_entry(row, profiles.remove(&patient_id));

        let upcoming_appointments = AppointmentService::new(self.pool.clone())
            .upcoming_with(doctor_id, Some(patient_id), UPCOMING_LIMIT)
            .await?;

        let recent_records = sqlx::query_as::<_, MedicalRecord>(
            "SELECT id, doctor_id, patient_id, title, record_type, description, data, created_at, updated_at
             FROM medical_records
             WHERE doctor_id = $1 AND patient_id = $2
             ORDER BY created_at DESC
             LIMIT $3",
        )
        .bind(doctor_id)
        .bind(patient_id)
        .bind(RECENT_RECORDS_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(PatientDetail {
            summary,
            upcoming_appointments,
            recent_records,
        })
    }

    async fn activity(&self, doctor_id: Uuid, only: Option<Uuid>) -> Result<Vec<PatientActivityRow>, ApiError> {
        let sql = format!(
            "SELECT p.patient_id,
                    (SELECT a.patient_name FROM appointments a
                      WHERE a.doctor_id = $1 AND a.patient_id = p.patient_id AND a.patient_name IS NOT NULL
                      ORDER BY a.scheduled_at DESC LIMIT 1) AS patient_name,
                    (SELECT MAX(a.scheduled_at) FROM appointments a
                      WHERE a.doctor_id = $1 AND a.patient_id = p.patient_id) AS last_appointment_at,
                    (SELECT COUNT(*) FROM appointments a
                      WHERE a.doctor_id = $1 AND a.patient_id = p.patient_id) AS appointment_count,
                    (SELECT COUNT(*) FROM medical_records r
                      WHERE r.doctor_id = $1 AND r.patient_id = p.patient_id) AS record_count
             FROM ({}) p
             WHERE $2::uuid IS NULL OR p.patient_id = $2
             ORDER BY last_appointment_at DESC NULLS LAST, p.patient_id",
            RELATED_PATIENTS_SQL
        );

        Ok(sqlx::query_as::<_, PatientActivityRow>(&sql)
            .bind(doctor_id)
            .bind(only)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Profile lookup is best effort; the list still renders from local data
    async fn profiles(&self, ids: &[Uuid]) -> HashMap<Uuid, PatientProfile> {
        let Some(directory) = self.directory.as_deref() else {
            return HashMap::new();
        };
        if ids.is_empty() {
            return HashMap::new();
        }
        match directory.profiles(ids).await {
            Ok(profiles) => profiles.into_iter().map(|p| (p.id, p)).collect(),
            Err(e) => {
                tracing::warn!("Patient profile lookup failed for {} ids: {}", ids.len(), e);
                HashMap::new()
            }
        }
    }
}

/// True when the doctor has any appointment, record or conversation with the patient
pub async fn doctor_knows_patient(pool: &PgPool, doctor_id: Uuid, patient_id: Uuid) -> Result<bool, ApiError> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM ({}) p WHERE p.patient_id = $2)", RELATED_PATIENTS_SQL);
    Ok(sqlx::query_scalar::<_, bool>(&sql)
        .bind(doctor_id)
        .bind(patient_id)
        .fetch_one(pool)
        .await?)
}

fn into_entry(row: PatientActivityRow, profile: Option<PatientProfile>) -> PatientListEntry {
    let name = profile
        .as_ref()
        .and_then(|p| p.full_name.clone())
        .or(row.patient_name);
    PatientListEntry {
        id: row.patient_id,
        name,
        profile,
        last_appointment_at: row.last_appointment_at,
        appointment_count: row.appointment_count,
        record_count: row.record_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: Option<&str>) -> PatientActivityRow {
        PatientActivityRow {
            patient_id: Uuid::new_v4(),
            patient_name: name.map(str::to_string),
            last_appointment_at: None,
            appointment_count: 2,
            record_count: 1,
        }
    }

    fn profile(id: Uuid, full_name: Option<&str>) -> PatientProfile {
        PatientProfile {
            id,
            full_name: full_name.map(str::to_string),
            email: None,
            phone: None,
            date_of_birth: None,
            gender: None,
            avatar_url: None,
        }
    }

    #[test]
    fn profile_name_wins_over_appointment_name() {
        let row = row(Some("J. Doe"));
        let id = row.patient_id;
        let entry = into_entry(row, Some(profile(id, Some("Jane Doe"))));
        assert_eq!(entry.name.as_deref(), Some("Jane Doe"));
        assert_eq!(entry.appointment_count, 2);
    }

    #[test]
    fn appointment_name_used_without_profile() {
        let entry = into_entry(row(Some("J. Doe")), None);
        assert_eq!(entry.name.as_deref(), Some("J. Doe"));

        let row = row(Some("J. Doe"));
        let id = row.patient_id;
        let entry = into_entry(row, Some(profile(id, None)));
        assert_eq!(entry.name.as_deref(), Some("J. Doe"));
    }
}
