// handlers/protected/collab.rs - /api/collab/threads (doctor only)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::collab::{CollabMessage, CollabThread, CollabThreadSummary};
use crate::middleware::{Actor, ApiResponse, ApiResult};
use crate::services::collab_service::OutgoingCollabMessage;
use crate::services::CollabService;
use crate::state::AppState;

const DEFAULT_MESSAGE_PAGE: i64 = 50;
const MAX_MESSAGE_PAGE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct OpenThreadRequest {
    pub doctor_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

fn service(state: &AppState) -> CollabService {
    CollabService::new(state.pool.clone(), state.cipher.clone())
}

pub async fn open_thread(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<OpenThreadRequest>,
) -> ApiResult<CollabThread> {
    let doctor = actor.require_doctor()?;
    let (thread, created) = service(&state).open_thread(doctor, req.doctor_id).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(ApiResponse::with_status(thread, status))
}

pub async fn list_threads(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<CollabThreadSummary>> {
    let doctor = actor.require_doctor()?;
    let threads = service(&state).list_threads(doctor.id).await?;
    Ok(ApiResponse::success(threads))
}

pub async fn messages(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Vec<CollabMessage>> {
    let doctor = actor.require_doctor()?;
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_PAGE).clamp(1, MAX_MESSAGE_PAGE);
    let messages = service(&state).messages(doctor.id, id, query.before, limit).await?;
    Ok(ApiResponse::success(messages))
}

pub async fn send(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(outgoing): Json<OutgoingCollabMessage>,
) -> ApiResult<CollabMessage> {
    let doctor = actor.require_doctor()?;
    let message = service(&state).send(doctor.id, id, outgoing).await?;
    Ok(ApiResponse::created(message))
}
