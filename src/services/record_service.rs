use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::api::Page;
use crate::database::models::conversation::ActorKind;
use crate::database::models::record::{is_known_record_type, MedicalRecord, RECORD_TYPES};
use crate::error::ApiError;

const RECORD_COLUMNS: &str =
    "id, doctor_id, patient_id, title, record_type, description, data, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewRecord {
    pub patient_id: Uuid,
    pub title: String,
    pub record_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordUpdate {
    pub title: Option<String>,
    pub record_type: Option<String>,
    pub description: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub patient_id: Option<Uuid>,
    pub record_type: Option<String>,
}

pub struct RecordService {
    pool: PgPool,
}

impl RecordService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        actor: ActorKind,
        actor_id: Uuid,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<Vec<MedicalRecord>, ApiError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM medical_records WHERE ", RECORD_COLUMNS));
        match actor {
            ActorKind::Doctor => qb.push("doctor_id = ").push_bind(actor_id),
            ActorKind::Patient => qb.push("patient_id = ").push_bind(actor_id),
        };
        if let Some(patient_id) = filter.patient_id {
            qb.push(" AND patient_id = ").push_bind(patient_id);
        }
        if let Some(record_type) = &filter.record_type {
            validate_record_type(record_type)?;
            qb.push(" AND record_type = ").push_bind(record_type.clone());
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        Ok(qb.build_query_as::<MedicalRecord>().fetch_all(&self.pool).await?)
    }

    /// Readable by the authoring doctor and by the patient it describes
    pub async fn get_for(&self, actor: ActorKind, actor_id: Uuid, id: Uuid) -> Result<MedicalRecord, ApiError> {
        let record = self.find(id).await?;
        let allowed = match actor {
            ActorKind::Doctor => record.doctor_id == actor_id,
            ActorKind::Patient => record.patient_id == actor_id,
        };
        if !allowed {
            return Err(ApiError::not_found("Record not found"));
        }
        Ok(record)
    }

    pub async fn create(&self, doctor_id: Uuid, new: NewRecord) -> Result<MedicalRecord, ApiError> {
        let title = validate_title(&new.title)?;
        validate_record_type(&new.record_type)?;
        let data = new.data.unwrap_or_else(|| Value::Object(Default::default()));
        validate_data(&data)?;

        let sql = format!(
            "INSERT INTO medical_records (id, doctor_id, patient_id, title, record_type, description, data)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            RECORD_COLUMNS
        );
        let record = sqlx::query_as::<_, MedicalRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(doctor_id)
            .bind(new.patient_id)
            .bind(title)
            .bind(&new.record_type)
            .bind(&new.description)
            .bind(&data)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!("Doctor {} created {} record {}", doctor_id, record.record_type, record.id);
        Ok(record)
    }

    pub async fn update(&self, doctor_id: Uuid, id: Uuid, update: RecordUpdate) -> Result<MedicalRecord, ApiError> {
        let title = update.title.as_deref().map(validate_title).transpose()?;
        if let Some(record_type) = &update.record_type {
            validate_record_type(record_type)?;
        }
        if let Some(data) = &update.data {
            validate_data(data)?;
        }

        let sql = format!(
            "UPDATE medical_records SET
                title = COALESCE($3, title),
                record_type = COALESCE($4, record_type),
                description = COALESCE($5, description),
                data = COALESCE($6, data),
                updated_at = NOW()
             WHERE id = $1 AND doctor_id = $2
             RETURNING {}",
            RECORD_COLUMNS
        );
        sqlx::query_as::<_, MedicalRecord>(&sql)
            .bind(id)
            .bind(doctor_id)
            .bind(title)
            .bind(&update.record_type)
            .bind(&update.description)
            .bind(&update.data)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Record not found"))
    }

    pub async fn delete(&self, doctor_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM medical_records WHERE id = $1 AND doctor_id = $2")
            .bind(id)
            .bind(doctor_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Record not found"));
        }
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<MedicalRecord, ApiError> {
        let sql = format!("SELECT {} FROM medical_records WHERE id = $1", RECORD_COLUMNS);
        sqlx::query_as::<_, MedicalRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Record not found"))
    }
}

fn validate_title(title: &str) -> Result<&str, ApiError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(ApiError::invalid_field("title", "Title must be 1 to 200 characters"));
    }
    Ok(title)
}

fn validate_record_type(record_type: &str) -> Result<(), ApiError> {
    if !is_known_record_type(record_type) {
        return Err(ApiError::invalid_field(
            "record_type",
            format!("Must be one of: {}", RECORD_TYPES.join(", ")),
        ));
    }
    Ok(())
}

fn validate_data(data: &Value) -> Result<(), ApiError> {
    if !data.is_object() {
        return Err(ApiError::invalid_field("data", "Must be a JSON object"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_types() {
        assert!(validate_record_type("lab_result").is_ok());
        assert!(validate_record_type("xray").is_err());
    }

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(validate_title("  HbA1c panel ").unwrap(), "HbA1c panel");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"t".repeat(201)).is_err());
    }

    #[test]
    fn data_must_be_object() {
        assert!(validate_data(&json!({"hba1c": 6.8})).is_ok());
        assert!(validate_data(&json!([1, 2])).is_err());
    }
}
