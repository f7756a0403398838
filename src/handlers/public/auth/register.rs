// handlers/public/auth/register.rs - POST /auth/doctors/register

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{issue_token, TokenResponse};
use crate::auth;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::doctor_service::{self, NewDoctor};
use crate::services::DoctorService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub specialty: Option<String>,
    pub clinic: String,
}

/// Creates a doctor account and signs them in.
///
/// Email is lowercased and must be unique (409). Name, password and the
/// clinic slug are validated before anything is hashed.
pub async fn register_post(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> ApiResult<TokenResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid_field("name", "Name is required"));
    }
    doctor_service::validate_email(&req.email).map_err(|e| ApiError::invalid_field("email", e))?;
    doctor_service::validate_password(&req.password).map_err(|e| ApiError::invalid_field("password", e))?;
    let clinic = req.clinic.trim().to_string();
    doctor_service::validate_clinic_slug(&clinic).map_err(|e| ApiError::invalid_field("clinic", e))?;

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| {
            tracing::error!("Password hashing task failed: {}", e);
            ApiError::internal_server_error("Failed to register doctor")
        })?
        .map_err(|e| {
            tracing::error!("Password hashing failed: {}", e);
            ApiError::internal_server_error("Failed to register doctor")
        })?;

    let doctor = DoctorService::new(state.pool.clone())
        .create(NewDoctor {
            name: name.to_string(),
            email: req.email,
            password_hash,
            specialty: req.specialty.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            clinic,
        })
        .await?;

    Ok(ApiResponse::created(issue_token(doctor)?))
}
