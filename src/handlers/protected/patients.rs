// handlers/protected/patients.rs - Doctor-facing patient views

use axum::{
    extract::{Path, State},
    Extension,
};
use uuid::Uuid;

use crate::middleware::{Actor, ApiResponse, ApiResult};
use crate::services::patient_service::{PatientDetail, PatientListEntry};
use crate::services::PatientService;
use crate::state::AppState;

/// GET /api/patients
pub async fn list(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> ApiResult<Vec<PatientListEntry>> {
    let doctor = actor.require_doctor()?;
    let patients = PatientService::new(state.pool.clone(), state.patients.clone())
        .list(doctor.id)
        .await?;
    Ok(ApiResponse::success(patients))
}

/// GET /api/patients/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<PatientDetail> {
    let doctor = actor.require_doctor()?;
    let detail = PatientService::new(state.pool.clone(), state.patients.clone())
        .detail(doctor.id, id)
        .await?;
    Ok(ApiResponse::success(detail))
}
