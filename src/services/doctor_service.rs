use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::doctor::{Doctor, DoctorSummary};
use crate::database::DatabaseError;

const DOCTOR_COLUMNS: &str =
    "id, name, email, password_hash, specialty, bio, clinic, is_active, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub specialty: Option<String>,
    pub clinic: String,
}

#[derive(Debug, Clone, Default)]
pub struct DoctorProfileUpdate {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub bio: Option<String>,
}

pub struct DoctorService {
    pool: PgPool,
}

impl DoctorService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Doctor>, DatabaseError> {
        let sql = format!("SELECT {} FROM doctors WHERE id = $1", DOCTOR_COLUMNS);
        Ok(sqlx::query_as::<_, Doctor>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Emails are stored lowercased
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Doctor>, DatabaseError> {
        let sql = format!("SELECT {} FROM doctors WHERE email = $1", DOCTOR_COLUMNS);
        Ok(sqlx::query_as::<_, Doctor>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_active(&self, id: Uuid) -> Result<Doctor, DatabaseError> {
        match self.find_by_id(id).await? {
            Some(doctor) if doctor.is_active => Ok(doctor),
            _ => Err(DatabaseError::NotFound("Doctor not found".to_string())),
        }
    }

    pub async fn create(&self, new: NewDoctor) -> Result<Doctor, DatabaseError> {
        let sql = format!(
            "INSERT INTO doctors (id, name, email, password_hash, specialty, clinic)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            DOCTOR_COLUMNS
        );

        let result = sqlx::query_as::<_, Doctor>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.name.trim())
            .bind(normalize_email(&new.email))
            .bind(&new.password_hash)
            .bind(&new.specialty)
            .bind(&new.clinic)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(doctor) => {
                tracing::info!("Registered doctor {} in clinic '{}'", doctor.id, doctor.clinic);
                Ok(doctor)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(DatabaseError::Conflict(
                "A doctor with this email already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_profile(&self, id: Uuid, update: DoctorProfileUpdate) -> Result<Doctor, DatabaseError> {
        let sql = format!(
            "UPDATE doctors SET
                name = COALESCE($2, name),
                specialty = COALESCE($3, specialty),
                bio = COALESCE($4, bio),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            DOCTOR_COLUMNS
        );

        sqlx::query_as::<_, Doctor>(&sql)
            .bind(id)
            .bind(update.name.as_deref().map(str::trim))
            .bind(&update.specialty)
            .bind(&update.bio)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("Doctor not found".to_string()))
    }

    /// Active colleagues in the same clinic
    pub async fn directory(&self, clinic: &str, exclude: Uuid) -> Result<Vec<DoctorSummary>, DatabaseError> {
        Ok(sqlx::query_as::<_, DoctorSummary>(
            "SELECT id, name, specialty FROM doctors
             WHERE clinic = $1 AND id <> $2 AND is_active
             ORDER BY name",
        )
        .bind(clinic)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Returns false when no doctor has that email
    pub async fn set_active(&self, email: &str, active: bool) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE doctors SET is_active = $2, updated_at = NOW() WHERE email = $1")
            .bind(normalize_email(email))
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Clinic slugs: 2..=64 of `[a-z0-9-]`, not starting or ending with '-'
pub fn validate_clinic_slug(clinic: &str) -> Result<(), String> {
    if clinic.len() < 2 || clinic.len() > 64 {
        return Err("Clinic must be between 2 and 64 characters".to_string());
    }
    if !clinic.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err("Clinic can only contain lowercase letters, digits and hyphens".to_string());
    }
    if clinic.starts_with('-') || clinic.ends_with('-') {
        return Err("Clinic cannot start or end with a hyphen".to_string());
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') => Ok(()),
        _ => Err("Email address is not valid".to_string()),
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    // bcrypt ignores everything past 72 bytes
    if password.len() > 72 {
        return Err("Password must be at most 72 bytes".to_string());
    }
    Ok(())
}
