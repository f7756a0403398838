// handlers/protected/doctors.rs - Doctor profile and clinic directory

use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::database::models::doctor::{Doctor, DoctorSummary};
use crate::error::ApiError;
use crate::middleware::{Actor, ApiResponse, ApiResult};
use crate::services::doctor_service::DoctorProfileUpdate;
use crate::services::DoctorService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub bio: Option<String>,
}

/// PUT /api/doctors/me
pub async fn update_me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ProfileRequest>,
) -> ApiResult<Doctor> {
    let doctor = actor.require_doctor()?;
    if req.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(ApiError::invalid_field("name", "Name cannot be empty"));
    }

    let updated = DoctorService::new(state.pool.clone())
        .update_profile(
            doctor.id,
            DoctorProfileUpdate {
                name: req.name,
                specialty: req.specialty,
                bio: req.bio,
            },
        )
        .await?;
    Ok(ApiResponse::success(updated))
}

/// GET /api/doctors - active colleagues in the caller's clinic
pub async fn directory(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<DoctorSummary>> {
    let doctor = actor.require_doctor()?;
    let colleagues = DoctorService::new(state.pool.clone())
        .directory(&doctor.clinic, doctor.id)
        .await?;
    Ok(ApiResponse::success(colleagues))
}
