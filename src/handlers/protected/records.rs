// handlers/protected/records.rs - /api/records[/:id]

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::PageQuery;
use crate::database::models::record::MedicalRecord;
use crate::middleware::{Actor, ApiResponse, ApiResult};
use crate::services::record_service::{NewRecord, RecordFilter, RecordUpdate};
use crate::services::RecordService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub patient_id: Option<Uuid>,
    pub record_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/records - doctors see what they wrote, patients what is about them
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<MedicalRecord>> {
    let page = PageQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .page();
    let filter = RecordFilter {
        patient_id: query.patient_id,
        record_type: query.record_type,
    };

    let records = RecordService::new(state.pool.clone())
        .list(actor.kind(), actor.id(), &filter, page)
        .await?;
    Ok(ApiResponse::paged(records, page))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(new): Json<NewRecord>,
) -> ApiResult<MedicalRecord> {
    let doctor = actor.require_doctor()?;
    let record = RecordService::new(state.pool.clone()).create(doctor.id, new).await?;
    Ok(ApiResponse::created(record))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<MedicalRecord> {
    let record = RecordService::new(state.pool.clone())
        .get_for(actor.kind(), actor.id(), id)
        .await?;
    Ok(ApiResponse::success(record))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(update): Json<RecordUpdate>,
) -> ApiResult<MedicalRecord> {
    let doctor = actor.require_doctor()?;
    let record = RecordService::new(state.pool.clone()).update(doctor.id, id, update).await?;
    Ok(ApiResponse::success(record))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let doctor = actor.require_doctor()?;
    RecordService::new(state.pool.clone()).delete(doctor.id, id).await?;
    Ok(ApiResponse::no_content())
}
