// handlers/protected/appointments.rs - /api/appointments[/:id]

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::PageQuery;
use crate::database::models::appointment::{Appointment, AppointmentKind, AppointmentStatus};
use crate::error::ApiError;
use crate::integrations::agora::RtcToken;
use crate::integrations::RtcRole;
use crate::middleware::{Actor, ApiResponse, ApiResult};
use crate::services::appointment_service::{AppointmentFilter, AppointmentUpdate, NewAppointment};
use crate::services::AppointmentService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub patient_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoTokenRequest {
    #[serde(default)]
    pub role: Option<RtcRole>,
}

/// GET /api/appointments
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Appointment>> {
    let page = PageQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .page();
    let filter = AppointmentFilter {
        status: query.status,
        from: query.from,
        to: query.to,
        patient_id: query.patient_id,
    };

    let appointments = AppointmentService::new(state.pool.clone())
        .list(actor.kind(), actor.id(), &filter, page)
        .await?;
    Ok(ApiResponse::paged(appointments, page))
}

/// POST /api/appointments (doctor)
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(new): Json<NewAppointment>,
) -> ApiResult<Appointment> {
    let doctor = actor.require_doctor()?;
    let appointment = AppointmentService::new(state.pool.clone()).create(doctor.id, new).await?;
    Ok(ApiResponse::created(appointment))
}

/// GET /api/appointments/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<Appointment> {
    let appointment = AppointmentService::new(state.pool.clone())
        .get_for(actor.kind(), actor.id(), id)
        .await?;
    Ok(ApiResponse::success(appointment))
}

/// PATCH /api/appointments/:id (doctor)
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(update): Json<AppointmentUpdate>,
) -> ApiResult<Appointment> {
    let doctor = actor.require_doctor()?;
    let appointment = AppointmentService::new(state.pool.clone())
        .update(doctor.id, id, update)
        .await?;
    Ok(ApiResponse::success(appointment))
}

/// POST /api/appointments/:id/status
pub async fn set_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Appointment> {
    let appointment = AppointmentService::new(state.pool.clone())
        .set_status(actor.kind(), actor.id(), id, req.status)
        .await?;
    Ok(ApiResponse::success(appointment))
}

/// DELETE /api/appointments/:id (doctor)
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let doctor = actor.require_doctor()?;
    AppointmentService::new(state.pool.clone()).delete(doctor.id, id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/appointments/:id/video-token
///
/// Both participants join the appointment's channel as uid 0. Only open
/// video appointments hand out tokens.
pub async fn video_token(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    body: Option<Json<VideoTokenRequest>>,
) -> ApiResult<RtcToken> {
    let builder = state.video()?;
    let appointment = AppointmentService::new(state.pool.clone())
        .get_for(actor.kind(), actor.id(), id)
        .await?;

    if appointment.kind != AppointmentKind::Video {
        return Err(ApiError::bad_request("Appointment is not a video consultation"));
    }
    if matches!(
        appointment.status,
        AppointmentStatus::Cancelled | AppointmentStatus::Completed | AppointmentStatus::NoShow
    ) {
        return Err(ApiError::conflict(format!(
            "Appointment is {}; video is no longer available",
            appointment.status.as_str()
        )));
    }
    let channel = appointment
        .video_channel
        .as_deref()
        .ok_or_else(|| ApiError::conflict("Appointment has no video channel"))?;

    let role = body.and_then(|Json(req)| req.role).unwrap_or_default();
    let token = builder.build(channel, 0, role)?;

    tracing::info!(
        "Issued {:?} video token for appointment {} to {} {}",
        role,
        id,
        actor.kind().as_str(),
        actor.id()
    );
    Ok(ApiResponse::success(token))
}
